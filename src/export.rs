//! Export of cohort datasets for upload to the clinical database.
//!
//! Subject ids are harmonized to the central `iBE-` format, studies are replaced by visit
//! numbers, and body parts that are only partially inside the field of view are removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use snafu::ResultExt;
use tracing::{info, warn};

use crate::dmr::{self, Dmr};
use crate::errors::archive::{ArchiveError, IOSnafu};
use crate::file::DmrFileOperations;
use crate::layout::Group;
use crate::store::COHORT_SUFFIX;

/// Body parts that are routinely cut off by the field of view. Kidneys are delivered by a
/// dedicated kidney volumetry pipeline.
pub const DROPPED_BODY_PARTS: [&str; 25] = [
    "clavicula_left",
    "clavicula_right",
    "femur_left",
    "femur_right",
    "humerus_left",
    "humerus_right",
    "prostate",
    "scapula_left",
    "scapula_right",
    "urinary_bladder",
    "gallbladder",
    "heart",
    "lung_right",
    "lung_left",
    "gluteus_maximus_right",
    "gluteus_maximus_left",
    "gluteus_medius_left",
    "gluteus_medius_right",
    "gluteus_minimus_left",
    "gluteus_minimus_right",
    "sacrum",
    "hip_left",
    "hip_right",
    "kidney_left",
    "kidney_right",
];

/// Column renames applied to the exported CSV tables.
pub const RENAMED_COLUMNS: [(&str, &str); 3] = [
    ("subject", "harmonized_id"),
    ("study", "visit_nr"),
    ("value", "result"),
];

const DATASET_NAME: &str = "OrgansShape";

/// Central subject id: `iBE-` followed by the local id without underscores.
pub fn harmonized_id(subject: &str) -> String {
    format!("iBE-{}", subject.replace('_', ""))
}

/// Visit number of a study: `Baseline` is 0, `Followup` is 2 and `VisitN` is N - 1.
pub fn visit_nr(study: &str) -> Option<u32> {
    match study {
        "Baseline" => Some(0),
        "Followup" => Some(2),
        _ => study
            .strip_prefix("Visit")
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(|n| n.checked_sub(1)),
    }
}

/// Files written for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDataset {
    pub archive: PathBuf,
    pub long: PathBuf,
    pub wide: PathBuf,
}

/// Harmonize ids and visits, add the `image` column and drop partially covered body parts.
pub fn harmonize(dmr: &mut Dmr) {
    dmr.map_subjects(|subject, study| {
        let visit = match visit_nr(study) {
            Some(visit) => visit.to_string(),
            None => {
                warn!("Unknown study {} of subject {}, exported unchanged", study, subject);
                study.to_string()
            }
        };
        (harmonized_id(subject), visit)
    });
    let index = dmr
        .columns
        .iter()
        .position(|c| c == "body_part")
        .map_or(0, |i| i + 1);
    dmr.insert_column(index, "image", "mask");
    let dropped = dmr.drop_body_parts(&DROPPED_BODY_PARTS);
    info!("Dropped {} values of partially covered body parts", dropped);
}

/// Export the cohort dataset of one group from `measure_dir` into `results_dir`.
/// Returns `None` when the group has no cohort dataset.
pub fn export_group<P: AsRef<Path>, Q: AsRef<Path>>(
    measure_dir: P,
    results_dir: Q,
    group: &Group,
    date: NaiveDate,
) -> Result<Option<ExportedDataset>, ArchiveError> {
    let source = measure_dir
        .as_ref()
        .join(format!("{}_{}", group.name(), COHORT_SUFFIX))
        .with_dmr_extension();
    if !source.is_file() {
        warn!("No cohort dataset at {}", source.display());
        return Ok(None);
    }
    let results_dir = results_dir.as_ref();
    std::fs::create_dir_all(results_dir).context(IOSnafu { path: results_dir })?;

    let mut dmr = dmr::read(&source)?;
    harmonize(&mut dmr);

    let stem = format!("{}_{}_{}", group.name(), DATASET_NAME, date.format("%Y-%m-%d"));
    let archive = dmr::write(results_dir.join(&stem), &dmr)?;
    let long = results_dir.join(format!("{}.csv", stem));
    let wide = results_dir.join(format!("{}_wide.csv", stem));
    dmr::write_long(&dmr, &long)?;
    dmr::write_wide(&dmr, &wide)?;

    let names = HashMap::from(RENAMED_COLUMNS);
    dmr::rename_columns(&long, &names)?;
    dmr::rename_columns(&wide, &names)?;

    info!("Exported {} to {}", group, archive.display());
    Ok(Some(ExportedDataset {
        archive,
        long,
        wide,
    }))
}

/// Export both groups.
pub fn export<P: AsRef<Path>, Q: AsRef<Path>>(
    measure_dir: P,
    results_dir: Q,
    date: NaiveDate,
) -> Result<Vec<ExportedDataset>, ArchiveError> {
    let mut exported = Vec::new();
    for group in Group::all() {
        if let Some(dataset) = export_group(&measure_dir, &results_dir, &group, date)? {
            exported.push(dataset);
        }
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmr::{ParameterInfo, DEFAULT_COLUMNS};
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("1128_001", "iBE-1128001")]
    #[case("2128C05", "iBE-2128C05")]
    fn test_harmonized_id(#[case] subject: &str, #[case] expected: &str) {
        assert_eq!(harmonized_id(subject), expected);
    }

    #[rstest]
    #[case("Baseline", Some(0))]
    #[case("Followup", Some(2))]
    #[case("Visit1", Some(0))]
    #[case("Visit3", Some(2))]
    #[case("Visit0", None)]
    #[case("Screening", None)]
    fn test_visit_nr(#[case] study: &str, #[case] expected: Option<u32>) {
        assert_eq!(visit_nr(study), expected);
    }

    fn cohort() -> Dmr {
        let mut dmr = Dmr {
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        for (part, value) in [("liver", 1500.0), ("heart", 700.0), ("kidney_left", 150.0)] {
            let parameter = format!("{}-shape_ski-volume", part);
            dmr.data.insert(
                parameter.clone(),
                ParameterInfo {
                    description: "Volume".into(),
                    unit: "mL".into(),
                    value_type: "float".into(),
                    extra: vec![part.into(), "shape_ski".into(), "volume".into()],
                },
            );
            dmr.pars.insert(
                ("1128_001".into(), "Baseline".into(), parameter.clone()),
                value,
            );
            dmr.pars
                .insert(("1128_002".into(), "Followup".into(), parameter), value + 1.0);
        }
        dmr
    }

    #[test]
    fn test_harmonize() {
        let mut dmr = cohort();
        harmonize(&mut dmr);
        assert_eq!(
            dmr.columns,
            vec!["body_part", "image", "biomarker_category", "biomarker"]
        );
        assert_eq!(dmr.parameters().into_iter().collect::<Vec<_>>(), vec!["liver-shape_ski-volume"]);
        assert_eq!(
            dmr.subjects().into_iter().collect::<Vec<_>>(),
            vec![("iBE-1128001", "0"), ("iBE-1128002", "2")]
        );
        assert_eq!(dmr.extra("liver-shape_ski-volume", "image"), Some("mask"));
    }

    #[test]
    fn test_export() {
        let dir = TempDir::new().unwrap();
        let measure = dir.path().join("stage_3_measure");
        let results = dir.path().join("stage_3_export");
        dmr::write(measure.join("Controls_totseg_auto"), &cohort()).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let exported = export(&measure, &results, date).unwrap();
        assert_eq!(exported.len(), 1);
        let dataset = &exported[0];
        assert_eq!(
            dataset.archive,
            results.join("Controls_OrgansShape_2024-05-17.dmr.zip")
        );
        assert_eq!(dataset.long, results.join("Controls_OrgansShape_2024-05-17.csv"));
        assert_eq!(
            dataset.wide,
            results.join("Controls_OrgansShape_2024-05-17_wide.csv")
        );

        let long = std::fs::read_to_string(&dataset.long).unwrap();
        let mut lines = long.lines();
        assert_eq!(
            lines.next().unwrap(),
            "harmonized_id,visit_nr,parameter,description,result,unit,type,body_part,image,biomarker_category,biomarker"
        );
        assert_eq!(
            lines.next().unwrap(),
            "iBE-1128001,0,liver-shape_ski-volume,Volume,1500,mL,float,liver,mask,shape_ski,volume"
        );

        let wide = std::fs::read_to_string(&dataset.wide).unwrap();
        assert_eq!(
            wide.lines().collect::<Vec<_>>(),
            vec![
                "harmonized_id,visit_nr,liver-shape_ski-volume",
                "iBE-1128001,0,1500",
                "iBE-1128002,2,1501",
            ]
        );
        assert_eq!(dmr::read(&dataset.archive).unwrap().len(), 2);
    }
}
