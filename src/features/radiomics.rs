use std::f64::consts::PI;

use super::geometry::{max_diameter_2d, max_diameter_3d, slice_hulls, surface_area, Moments};
use super::{Feature, FeatureBackend, FeatureSet, Features};
use crate::errors::FeatureError;
use crate::volume::RegionMask;

/// Shape features named after the PyRadiomics `shape` class.
///
/// Volume and surface are measured on the voxel grid: the volume is the voxel count times the
/// voxel volume and the surface is the area of the exposed voxel faces. Diameters are distances
/// between voxel centres.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadiomicsShape;

impl FeatureBackend for RadiomicsShape {
    fn name(&self) -> &'static str {
        "radiomics-shapes"
    }

    fn category(&self) -> &'static str {
        "shape"
    }

    fn features(&self, mask: &RegionMask, region: &str) -> Result<Features, FeatureError> {
        if mask.voxels() == 0 {
            return Err(FeatureError::EmptyMask {
                region: region.to_string(),
            });
        }
        let volume = mask.voxels() as f64 * mask.voxel_volume_mm3();
        let area = surface_area(mask);
        let sphere = (36.0 * PI * volume.powi(2)).cbrt();

        let hulls = slice_hulls(mask);
        let moments = Moments::from_mask(mask);
        let [major, minor, least] = moments.axis_lengths();
        let [l1, l2, l3] = moments.eigenvalues;

        let mut set = FeatureSet::new(region, self.category());
        set.push("VoxelVolume", Feature::float(volume, "Voxel volume", "mm^3"))?;
        set.push("SurfaceArea", Feature::float(area, "Surface area", "mm^2"))?;
        set.push(
            "SurfaceVolumeRatio",
            Feature::float(area / volume, "Surface to volume ratio", "mm^-1"),
        )?;
        set.push("Sphericity", Feature::float(sphere / area, "Sphericity", ""))?;
        set.push(
            "Compactness1",
            Feature::float(volume / (PI * area.powi(3)).sqrt(), "Compactness 1", ""),
        )?;
        set.push(
            "Compactness2",
            Feature::float(36.0 * PI * volume.powi(2) / area.powi(3), "Compactness 2", ""),
        )?;
        set.push(
            "SphericalDisproportion",
            Feature::float(area / sphere, "Spherical disproportion", ""),
        )?;
        set.push(
            "Maximum3DDiameter",
            Feature::float(max_diameter_3d(&hulls), "Maximum 3D diameter", "mm"),
        )?;
        set.push(
            "Maximum2DDiameterSlice",
            Feature::float(max_diameter_2d(&hulls), "Maximum 2D diameter in a slice", "mm"),
        )?;
        set.push("MajorAxisLength", Feature::float(major, "Major axis length", "mm"))?;
        set.push("MinorAxisLength", Feature::float(minor, "Minor axis length", "mm"))?;
        set.push("LeastAxisLength", Feature::float(least, "Least axis length", "mm"))?;
        // Axis ratios are undefined without a major axis and are left out
        if l1 > 0.0 {
            set.push("Elongation", Feature::float((l2 / l1).sqrt(), "Elongation", ""))?;
            set.push("Flatness", Feature::float((l3 / l1).sqrt(), "Flatness", ""))?;
        }
        Ok(set.finish())
    }
}
