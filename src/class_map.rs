//! Label tables of the MR segmentation tasks.
//!
//! Each task maps the integer labels of a segmentation volume to organ names.
//! Labels start at 1 (0 is background) and are listed in increasing order, which
//! is also the order in which regions are measured.

use snafu::OptionExt;
use std::fmt;
use std::str::FromStr;

use crate::errors::{ClassMapError, UnknownOrganSnafu, UnknownTaskSnafu};

/// Ordered mapping of label to organ name.
pub type ClassMap = &'static [(u16, &'static str)];

const TOTAL_MR: ClassMap = &[
    (1, "spleen"),
    (2, "kidney_right"),
    (3, "kidney_left"),
    (4, "gallbladder"),
    (5, "liver"),
    (6, "stomach"),
    (7, "pancreas"),
    (8, "adrenal_gland_right"),
    (9, "adrenal_gland_left"),
    (10, "lung_left"),
    (11, "lung_right"),
    (12, "esophagus"),
    (13, "small_bowel"),
    (14, "duodenum"),
    (15, "colon"),
    (16, "urinary_bladder"),
    (17, "prostate"),
    (18, "sacrum"),
    (19, "vertebrae"),
    (20, "intervertebral_discs"),
    (21, "spinal_cord"),
    (22, "heart"),
    (23, "aorta"),
    (24, "inferior_vena_cava"),
    (25, "portal_vein_and_splenic_vein"),
    (26, "iliac_artery_left"),
    (27, "iliac_artery_right"),
    (28, "iliac_vena_left"),
    (29, "iliac_vena_right"),
    (30, "humerus_left"),
    (31, "humerus_right"),
    (32, "scapula_left"),
    (33, "scapula_right"),
    (34, "clavicula_left"),
    (35, "clavicula_right"),
    (36, "femur_left"),
    (37, "femur_right"),
    (38, "hip_left"),
    (39, "hip_right"),
    (40, "gluteus_maximus_left"),
    (41, "gluteus_maximus_right"),
    (42, "gluteus_medius_left"),
    (43, "gluteus_medius_right"),
    (44, "gluteus_minimus_left"),
    (45, "gluteus_minimus_right"),
    (46, "autochthon_left"),
    (47, "autochthon_right"),
    (48, "iliopsoas_left"),
    (49, "iliopsoas_right"),
    (50, "brain"),
];

const TISSUE_TYPES_MR: ClassMap = &[
    (1, "subcutaneous_fat"),
    (2, "torso_fat"),
    (3, "skeletal_muscle"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Task {
    #[value(name = "total_mr")]
    TotalMr,
    #[value(name = "tissue_types_mr")]
    TissueTypesMr,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::TotalMr, Task::TissueTypesMr];

    pub fn name(&self) -> &'static str {
        match self {
            Task::TotalMr => "total_mr",
            Task::TissueTypesMr => "tissue_types_mr",
        }
    }

    pub fn class_map(&self) -> ClassMap {
        match self {
            Task::TotalMr => TOTAL_MR,
            Task::TissueTypesMr => TISSUE_TYPES_MR,
        }
    }

    /// Reverse lookup of the label assigned to `organ`.
    pub fn label_of(&self, organ: &str) -> Result<u16, ClassMapError> {
        self.class_map()
            .iter()
            .find(|(_, name)| *name == organ)
            .map(|(label, _)| *label)
            .context(UnknownOrganSnafu {
                task: self.name(),
                organ,
            })
    }

    pub fn organ_of(&self, label: u16) -> Option<&'static str> {
        self.class_map()
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Task {
    type Err = ClassMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .context(UnknownTaskSnafu { name: s })
    }
}

/// Resolve the class map of a task given by name.
pub fn resolve(task: &str) -> Result<ClassMap, ClassMapError> {
    Ok(task.parse::<Task>()?.class_map())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case::total("total_mr", 50)]
    #[case::tissue("tissue_types_mr", 3)]
    fn test_resolve(#[case] task: &str, #[case] expected_len: usize) {
        let map = resolve(task).unwrap();
        assert_eq!(map.len(), expected_len);
    }

    #[test]
    fn test_class_maps_are_ordered_and_unique() {
        for task in Task::ALL {
            let map = task.class_map();
            assert!(!map.is_empty());
            assert!(map.iter().all(|(label, _)| *label >= 1));
            assert!(map.windows(2).all(|w| w[0].0 < w[1].0));
            let names: HashSet<_> = map.iter().map(|(_, name)| *name).collect();
            assert_eq!(names.len(), map.len());
        }
    }

    #[rstest]
    #[case("total")]
    #[case("")]
    #[case("TOTAL_MR")]
    fn test_resolve_unknown(#[case] task: &str) {
        let err = resolve(task).unwrap_err();
        assert!(matches!(err, ClassMapError::UnknownTask { name } if name == task));
    }

    #[rstest]
    #[case(Task::TotalMr, "liver", 5)]
    #[case(Task::TotalMr, "pancreas", 7)]
    #[case(Task::TissueTypesMr, "skeletal_muscle", 3)]
    fn test_label_of(#[case] task: Task, #[case] organ: &str, #[case] expected: u16) {
        assert_eq!(task.label_of(organ).unwrap(), expected);
        assert_eq!(task.organ_of(expected), Some(organ));
    }

    #[test]
    fn test_label_of_unknown_organ() {
        let err = Task::TissueTypesMr.label_of("liver").unwrap_err();
        assert!(matches!(err, ClassMapError::UnknownOrgan { .. }));
    }

    #[test]
    fn test_display_roundtrip() {
        for task in Task::ALL {
            assert_eq!(task.to_string().parse::<Task>().unwrap(), task);
        }
    }
}
