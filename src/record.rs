use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error};

use crate::class_map::Task;
use crate::dmr::{Dmr, ParameterInfo, DEFAULT_COLUMNS};
use crate::errors::ClassMapError;
use crate::features::{default_backends, Feature, FeatureBackend, FeatureKey};
use crate::volume::{extract, LabelVolume};

/// All features measured on one image, keyed by `(subject, study, feature key)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    values: BTreeMap<(String, String, FeatureKey), Feature>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature, replacing any previous value under the same key.
    pub fn insert(
        &mut self,
        subject: &str,
        study: &str,
        key: FeatureKey,
        feature: Feature,
    ) -> Option<Feature> {
        self.values
            .insert((subject.to_string(), study.to_string(), key), feature)
    }

    pub fn get(&self, subject: &str, study: &str, key: &FeatureKey) -> Option<&Feature> {
        self.values
            .get(&(subject.to_string(), study.to_string(), key.clone()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, String, FeatureKey), &Feature)> {
        self.values.iter()
    }

    /// Regions that contributed at least one feature.
    pub fn body_parts(&self) -> BTreeSet<&str> {
        self.values
            .keys()
            .map(|(_, _, key)| key.body_part.as_str())
            .collect()
    }
}

impl From<&FeatureRecord> for Dmr {
    fn from(record: &FeatureRecord) -> Self {
        let mut dmr = Dmr {
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        for ((subject, study, key), feature) in record.iter() {
            let parameter = key.parameter();
            dmr.data.insert(
                parameter.clone(),
                ParameterInfo {
                    description: feature.description.clone(),
                    unit: feature.unit.clone(),
                    value_type: feature.value_type.to_string(),
                    extra: vec![
                        key.body_part.clone(),
                        key.category.clone(),
                        key.biomarker.clone(),
                    ],
                },
            );
            dmr.pars
                .insert((subject.clone(), study.clone(), parameter), feature.value);
        }
        dmr
    }
}

/// Measures every region of a label volume with a fixed set of back-ends.
pub struct RecordBuilder {
    task: Task,
    backends: Vec<Box<dyn FeatureBackend>>,
}

impl RecordBuilder {
    pub fn new(task: Task, backends: Vec<Box<dyn FeatureBackend>>) -> Self {
        Self { task, backends }
    }

    pub fn with_default_backends(task: Task) -> Self {
        Self::new(task, default_backends())
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Build the record of one image.
    ///
    /// Regions are visited in label order. Regions without voxels are skipped. A back-end that
    /// fails on a region is logged and contributes nothing for that region, while the other
    /// back-ends still do. An `organ_filter` that is not part of the task is an error.
    pub fn build(
        &self,
        patient: &str,
        study: &str,
        series: &str,
        volume: &LabelVolume,
        organ_filter: Option<&str>,
    ) -> Result<FeatureRecord, ClassMapError> {
        if let Some(organ) = organ_filter {
            self.task.label_of(organ)?;
        }

        let mut record = FeatureRecord::new();
        let regions = self
            .task
            .class_map()
            .iter()
            .filter(|(_, name)| organ_filter.map_or(true, |organ| organ == *name));

        for &(label, region) in regions {
            let Some(mask) = extract(volume, label) else {
                debug!("{} {} {}: no voxels for {}", patient, study, series, region);
                continue;
            };

            for backend in self.backends.iter() {
                match backend.features(&mask, region) {
                    Ok(features) => {
                        for (key, feature) in features {
                            record.insert(patient, study, key, feature);
                        }
                    }
                    Err(e) => error!(
                        "Patient {} {} - error computing {}: {}",
                        patient,
                        region,
                        backend.name(),
                        e
                    ),
                }
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FeatureError;
    use crate::features::{Features, RadiomicsShape, SkiShape};
    use crate::volume::RegionMask;
    use ndarray::{s, Array3};
    use rstest::rstest;

    /// Back-end that reports the voxel count, or fails on a chosen region.
    struct CountBackend {
        fail_on: Option<&'static str>,
    }

    impl FeatureBackend for CountBackend {
        fn name(&self) -> &'static str {
            "count"
        }

        fn category(&self) -> &'static str {
            "count"
        }

        fn features(&self, mask: &RegionMask, region: &str) -> Result<Features, FeatureError> {
            if self.fail_on == Some(region) {
                return Err(FeatureError::Other {
                    message: "boom".to_string(),
                });
            }
            Ok(vec![(
                FeatureKey::new(region, self.category(), "voxels"),
                Feature::int(mask.voxels(), "Voxels", ""),
            )])
        }
    }

    /// Tissue volume with subcutaneous fat (1) and skeletal muscle (3) present, torso fat (2) absent.
    fn tissue_volume() -> LabelVolume {
        let mut labels = Array3::<u16>::zeros((4, 6, 6));
        labels.slice_mut(s![0..2, 0..3, 0..3]).fill(1);
        labels.slice_mut(s![2..4, 2..5, 2..5]).fill(3);
        LabelVolume::from_spacing(labels, [1.5, 1.5, 3.0])
    }

    fn backends(fail_on: Option<&'static str>) -> Vec<Box<dyn FeatureBackend>> {
        vec![
            Box::new(SkiShape),
            Box::new(CountBackend { fail_on }),
            Box::new(RadiomicsShape),
        ]
    }

    #[test]
    fn test_record_contains_present_regions_only() {
        let builder = RecordBuilder::new(Task::TissueTypesMr, backends(None));
        let record = builder
            .build("001", "Baseline", "tissue_types_mr", &tissue_volume(), None)
            .unwrap();
        assert_eq!(
            record.body_parts().into_iter().collect::<Vec<_>>(),
            vec!["skeletal_muscle", "subcutaneous_fat"]
        );
        let key = FeatureKey::new("skeletal_muscle", "count", "voxels");
        assert_eq!(record.get("001", "Baseline", &key).unwrap().value, 18.0);
    }

    #[test]
    fn test_failing_backend_is_isolated() {
        let builder = RecordBuilder::new(Task::TissueTypesMr, backends(Some("subcutaneous_fat")));
        let record = builder
            .build("001", "Baseline", "tissue_types_mr", &tissue_volume(), None)
            .unwrap();

        let failed = FeatureKey::new("subcutaneous_fat", "count", "voxels");
        assert!(record.get("001", "Baseline", &failed).is_none());

        // The other back-ends still measured the region
        let categories = record
            .iter()
            .filter(|((_, _, key), _)| key.body_part == "subcutaneous_fat")
            .map(|((_, _, key), _)| key.category.as_str())
            .collect::<BTreeSet<_>>();
        assert_eq!(categories.into_iter().collect::<Vec<_>>(), vec!["shape", "shape_ski"]);

        let ok = FeatureKey::new("skeletal_muscle", "count", "voxels");
        assert!(record.get("001", "Baseline", &ok).is_some());
    }

    #[rstest]
    #[case::present(Some("skeletal_muscle"), vec!["skeletal_muscle"])]
    #[case::absent(Some("torso_fat"), vec![])]
    #[case::all(None, vec!["skeletal_muscle", "subcutaneous_fat"])]
    fn test_organ_filter(#[case] organ: Option<&str>, #[case] expected: Vec<&str>) {
        let builder = RecordBuilder::new(Task::TissueTypesMr, backends(None));
        let record = builder
            .build("001", "Baseline", "series", &tissue_volume(), organ)
            .unwrap();
        assert_eq!(record.body_parts().into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_unknown_organ_filter() {
        let builder = RecordBuilder::with_default_backends(Task::TissueTypesMr);
        let err = builder
            .build("001", "Baseline", "series", &tissue_volume(), Some("liver"))
            .unwrap_err();
        assert!(matches!(err, ClassMapError::UnknownOrgan { .. }));
    }

    #[test]
    fn test_single_voxel_region_is_recorded() {
        let mut labels = Array3::<u16>::zeros((3, 3, 3));
        labels[[1, 1, 1]] = 1;
        let volume = LabelVolume::from_spacing(labels, [1.5, 1.5, 3.0]);
        let record = RecordBuilder::with_default_backends(Task::TissueTypesMr)
            .build("001", "Baseline", "tissue_types_mr", &volume, None)
            .unwrap();

        let key = FeatureKey::new("subcutaneous_fat", "shape_ski", "voxel_count");
        assert_eq!(record.get("001", "Baseline", &key).unwrap().value, 1.0);
        let key = FeatureKey::new("subcutaneous_fat", "shape", "VoxelVolume");
        assert!((record.get("001", "Baseline", &key).unwrap().value - 6.75).abs() < 1e-12);
        assert_eq!(record.len(), 15 + 12);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = RecordBuilder::with_default_backends(Task::TissueTypesMr);
        let volume = tissue_volume();
        let a = builder.build("001", "Baseline", "s", &volume, None).unwrap();
        let b = builder.build("001", "Baseline", "s", &volume, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(Dmr::from(&a), Dmr::from(&b));
    }

    #[test]
    fn test_insert_replaces() {
        let mut record = FeatureRecord::new();
        let key = FeatureKey::new("liver", "volume", "size");
        assert!(record
            .insert("1", "Baseline", key.clone(), Feature::float(1.0, "Size", "mL"))
            .is_none());
        let previous = record.insert("1", "Baseline", key.clone(), Feature::float(2.0, "Size", "mL"));
        assert_eq!(previous.map(|f| f.value), Some(1.0));
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("1", "Baseline", &key).unwrap().value, 2.0);
    }

    #[test]
    fn test_into_dmr() {
        let mut record = FeatureRecord::new();
        record.insert(
            "1",
            "Baseline",
            FeatureKey::new("liver", "volume", "size"),
            Feature::float(120.5, "Size", "mL"),
        );
        let dmr = Dmr::from(&record);
        assert_eq!(dmr.columns, vec!["body_part", "biomarker_category", "biomarker"]);
        let info = &dmr.data["liver-volume-size"];
        assert_eq!(info.extra, vec!["liver", "volume", "size"]);
        assert_eq!(info.value_type, "float");
        assert_eq!(
            dmr.pars[&("1".to_string(), "Baseline".to_string(), "liver-volume-size".to_string())],
            120.5
        );
    }
}
