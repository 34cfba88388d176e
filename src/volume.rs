use ndarray::Array3;
use std::collections::BTreeSet;

/// Voxel index to patient coordinate transform, in millimetres.
///
/// Voxel indices are `(i, j, k)` = (column, row, slice), matching the
/// `(x, y, z)` order of [`LabelVolume::spacing`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Default for Affine {
    fn default() -> Self {
        Self::from_spacing([1.0, 1.0, 1.0])
    }
}

impl Affine {
    pub fn from_spacing(spacing: [f64; 3]) -> Self {
        let [sx, sy, sz] = spacing;
        Affine([
            [sx, 0.0, 0.0, 0.0],
            [0.0, sy, 0.0, 0.0],
            [0.0, 0.0, sz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Build the transform from DICOM geometry: the row and column direction cosines of
    /// ImageOrientationPatient, the ImagePositionPatient of the first slice and the
    /// `(x, y, z)` voxel spacing.
    pub fn from_dicom(
        row_direction: [f64; 3],
        column_direction: [f64; 3],
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Self {
        let normal = cross(row_direction, column_direction);
        let mut m = [[0.0; 4]; 4];
        for axis in 0..3 {
            m[axis][0] = row_direction[axis] * spacing[0];
            m[axis][1] = column_direction[axis] * spacing[1];
            m[axis][2] = normal[axis] * spacing[2];
            m[axis][3] = origin[axis];
        }
        m[3][3] = 1.0;
        Affine(m)
    }

    /// Map a (possibly fractional) voxel index to patient coordinates.
    pub fn apply(&self, ijk: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = m[axis][0] * ijk[0] + m[axis][1] * ijk[1] + m[axis][2] * ijk[2] + m[axis][3];
        }
        out
    }

    /// Voxel spacing implied by the transform, `(x, y, z)`.
    pub fn spacing(&self) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (col, value) in out.iter_mut().enumerate() {
            *value = (0..3).map(|row| m[row][col].powi(2)).sum::<f64>().sqrt();
        }
        out
    }
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Integer label volume produced by the segmentation stage.
///
/// `labels` is indexed `(slice, row, column)`.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    pub labels: Array3<u16>,
    pub spacing: [f64; 3],
    pub affine: Affine,
}

impl LabelVolume {
    pub fn new(labels: Array3<u16>, spacing: [f64; 3], affine: Affine) -> Self {
        Self {
            labels,
            spacing,
            affine,
        }
    }

    /// Volume with an axis-aligned affine derived from the spacing.
    pub fn from_spacing(labels: Array3<u16>, spacing: [f64; 3]) -> Self {
        Self::new(labels, spacing, Affine::from_spacing(spacing))
    }

    /// Non-background labels occurring in the volume.
    pub fn labels_present(&self) -> BTreeSet<u16> {
        self.labels.iter().copied().filter(|&v| v != 0).collect()
    }

    pub fn voxel_volume_mm3(&self) -> f64 {
        self.spacing.iter().product()
    }
}

/// Binary mask of a single region, sharing the geometry of its source volume.
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub mask: Array3<bool>,
    pub spacing: [f64; 3],
    pub affine: Affine,
    voxels: usize,
}

impl RegionMask {
    /// Build a mask directly, e.g. from a thresholded array. Returns `None` for an empty mask.
    pub fn new(mask: Array3<bool>, spacing: [f64; 3], affine: Affine) -> Option<Self> {
        let voxels = mask.iter().filter(|&&v| v).count();
        if voxels == 0 {
            return None;
        }
        Some(Self {
            mask,
            spacing,
            affine,
            voxels,
        })
    }

    pub fn voxels(&self) -> usize {
        self.voxels
    }

    pub fn voxel_volume_mm3(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// Foreground voxel indices as `(slice, row, column)`.
    pub fn indices(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.mask
            .indexed_iter()
            .filter(|(_, &v)| v)
            .map(|(idx, _)| idx)
    }

    /// Whether `(slice, row, column)` is foreground. Out-of-bounds indices are background.
    pub fn contains(&self, z: isize, y: isize, x: isize) -> bool {
        if z < 0 || y < 0 || x < 0 {
            return false;
        }
        self.mask
            .get((z as usize, y as usize, x as usize))
            .copied()
            .unwrap_or(false)
    }
}

/// Extract the binary mask of `label`. Returns `None` if the label has no voxels in the volume,
/// which is the normal outcome for an organ outside the field of view.
pub fn extract(volume: &LabelVolume, label: u16) -> Option<RegionMask> {
    let mask = volume.labels.mapv(|v| v == label);
    RegionMask::new(mask, volume.spacing, volume.affine)
}
