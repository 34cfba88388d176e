use std::f64::consts::PI;

use super::geometry::{bounding_box, surface_area, Moments};
use super::{Feature, FeatureBackend, FeatureSet, Features};
use crate::errors::FeatureError;
use crate::volume::RegionMask;

/// Region properties in the style of scikit-image `regionprops`, measured on the voxel grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkiShape;

impl FeatureBackend for SkiShape {
    fn name(&self) -> &'static str {
        "ski-shapes"
    }

    fn category(&self) -> &'static str {
        "shape_ski"
    }

    fn features(&self, mask: &RegionMask, region: &str) -> Result<Features, FeatureError> {
        if mask.voxels() == 0 {
            return Err(FeatureError::EmptyMask {
                region: region.to_string(),
            });
        }
        let [sx, sy, sz] = mask.spacing;
        let voxels = mask.voxels();
        let volume_mm3 = voxels as f64 * mask.voxel_volume_mm3();
        let area_mm2 = surface_area(mask);

        let (lo, hi) = bounding_box(mask);
        let extent_voxels = [hi[2] - lo[2] + 1, hi[1] - lo[1] + 1, hi[0] - lo[0] + 1];
        let bbox_voxels: usize = extent_voxels.iter().product();

        let moments = Moments::from_mask(mask);
        let centroid = mask.affine.apply(moments.centroid);
        let [major, intermediate, minor] = moments.axis_lengths();
        let [l1, _, l3] = moments.eigenvalues;

        let mut set = FeatureSet::new(region, self.category());
        set.push("volume", Feature::float(volume_mm3 / 1000.0, "Volume", "mL"))?;
        set.push("voxel_count", Feature::int(voxels, "Number of voxels", ""))?;
        set.push(
            "surface_area",
            Feature::float(area_mm2 / 100.0, "Surface area", "cm^2"),
        )?;
        set.push(
            "compactness",
            Feature::float(
                36.0 * PI * volume_mm3.powi(2) / area_mm2.powi(3),
                "Compactness",
                "",
            ),
        )?;
        set.push(
            "bbox_length_x",
            Feature::float(extent_voxels[0] as f64 * sx, "Bounding box length along x", "mm"),
        )?;
        set.push(
            "bbox_length_y",
            Feature::float(extent_voxels[1] as f64 * sy, "Bounding box length along y", "mm"),
        )?;
        set.push(
            "bbox_length_z",
            Feature::float(extent_voxels[2] as f64 * sz, "Bounding box length along z", "mm"),
        )?;
        set.push(
            "extent",
            Feature::float(
                voxels as f64 / bbox_voxels as f64,
                "Fraction of the bounding box occupied by the region",
                "",
            ),
        )?;
        set.push("centroid_x", Feature::float(centroid[0], "Centroid x", "mm"))?;
        set.push("centroid_y", Feature::float(centroid[1], "Centroid y", "mm"))?;
        set.push("centroid_z", Feature::float(centroid[2], "Centroid z", "mm"))?;
        set.push(
            "major_axis_length",
            Feature::float(major, "Major axis length", "mm"),
        )?;
        set.push(
            "intermediate_axis_length",
            Feature::float(intermediate, "Intermediate axis length", "mm"),
        )?;
        set.push(
            "minor_axis_length",
            Feature::float(minor, "Minor axis length", "mm"),
        )?;
        // A region without extent, such as a single voxel, is a point with no eccentricity
        let eccentricity = if l1 > 0.0 {
            (1.0 - l3 / l1).sqrt()
        } else {
            0.0
        };
        set.push(
            "eccentricity",
            Feature::float(eccentricity, "Eccentricity", ""),
        )?;
        Ok(set.finish())
    }
}
