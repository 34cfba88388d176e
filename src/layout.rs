//! Folder conventions of a pipeline build directory.
//!
//! ```text
//! <build>/totseg/<stage>/Controls/...
//! <build>/totseg/<stage>/Patients/<site>/...
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

pub const TOTSEG_DIR: &str = "totseg";
pub const LOG_FILENAME: &str = "error.log";

/// Sites contributing patient data.
pub const SITES: [&str; 6] = ["Bari", "Bordeaux", "Exeter", "Leeds", "Sheffield", "Turku"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Stage {
    #[value(name = "segment")]
    Segment,
    #[value(name = "measure")]
    Measure,
    #[value(name = "edit")]
    Edit,
    #[value(name = "edited-measure")]
    EditedMeasure,
    #[value(name = "export")]
    Export,
}

impl Stage {
    pub fn folder(&self) -> &'static str {
        match self {
            Stage::Segment => "stage_1_segment",
            Stage::Measure => "stage_3_measure",
            Stage::Edit => "stage_4_edit",
            Stage::EditedMeasure => "stage_5_measure",
            Stage::Export => "stage_3_export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.folder())
    }
}

/// A study group. Patients are organised per site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Group {
    Controls,
    Patients { site: Option<String> },
}

impl Group {
    /// Name of the group folder, which is also the prefix of cohort datasets.
    pub fn name(&self) -> &'static str {
        match self {
            Group::Controls => "Controls",
            Group::Patients { .. } => "Patients",
        }
    }

    pub fn patients(site: &str) -> Self {
        Group::Patients {
            site: Some(site.to_string()),
        }
    }

    /// Relative folder of the group, including the site when one is set.
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Group::Controls => PathBuf::from(self.name()),
            Group::Patients { site: Some(site) } => Path::new(self.name()).join(site),
            Group::Patients { site: None } => PathBuf::from(self.name()),
        }
    }

    /// Both groups, without a site restriction.
    pub fn all() -> [Group; 2] {
        [Group::Controls, Group::Patients { site: None }]
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Patients { site: Some(site) } => write!(f, "{}/{}", self.name(), site),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Paths inside a build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    build: PathBuf,
}

impl Layout {
    pub fn new<P: AsRef<Path>>(build: P) -> Self {
        Self {
            build: build.as_ref().to_path_buf(),
        }
    }

    pub fn build(&self) -> &Path {
        &self.build
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.build.join(TOTSEG_DIR).join(stage.folder())
    }

    pub fn group_dir(&self, stage: Stage, group: &Group) -> PathBuf {
        self.stage_dir(stage).join(group.relative_dir())
    }

    /// Default location of the error log.
    pub fn log_file(&self) -> PathBuf {
        self.build.join(LOG_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Stage::Segment, Group::Controls, "build/totseg/stage_1_segment/Controls")]
    #[case(Stage::Measure, Group::patients("Leeds"), "build/totseg/stage_3_measure/Patients/Leeds")]
    #[case(Stage::Edit, Group::patients("Bari"), "build/totseg/stage_4_edit/Patients/Bari")]
    #[case(Stage::EditedMeasure, Group::Patients { site: None }, "build/totseg/stage_5_measure/Patients")]
    fn test_group_dir(#[case] stage: Stage, #[case] group: Group, #[case] expected: &str) {
        let layout = Layout::new("build");
        assert_eq!(layout.group_dir(stage, &group), PathBuf::from(expected));
    }

    #[test]
    fn test_display_group() {
        assert_eq!(Group::patients("Turku").to_string(), "Patients/Turku");
        assert_eq!(Group::Controls.to_string(), "Controls");
    }

    #[test]
    fn test_log_file() {
        assert_eq!(Layout::new("/data/build").log_file(), PathBuf::from("/data/build/error.log"));
    }
}
