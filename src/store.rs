use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::info;

use crate::dmr::{self, Dmr};
use crate::errors::archive::{ArchiveError, IOSnafu};
use crate::file::{DmrFileOperations, DMR_SUFFIX};
use crate::layout::Group;
use crate::record::FeatureRecord;

/// Suffix of cohort datasets, `<group>_totseg_auto`.
pub const COHORT_SUFFIX: &str = "totseg_auto";

/// Per-image result archives of one group folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    dir: PathBuf,
}

/// Files produced by [`ResultStore::concatenate`].
#[derive(Debug, Clone, PartialEq)]
pub struct CohortDataset {
    pub archive: PathBuf,
    pub long: PathBuf,
    pub wide: PathBuf,
    pub dmr: Dmr,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive of an image: `<dir>/<patient>_<study>_<series>.dmr.zip`.
    pub fn archive_path(&self, patient: &str, study: &str, series: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}{}", patient, study, series, DMR_SUFFIX))
    }

    /// Whether the image was already measured.
    pub fn exists(&self, patient: &str, study: &str, series: &str) -> bool {
        self.archive_path(patient, study, series).is_file()
    }

    /// Persist the record of an image. The archive is complete or absent, never partial.
    pub fn save(
        &self,
        record: &FeatureRecord,
        patient: &str,
        study: &str,
        series: &str,
    ) -> Result<PathBuf, ArchiveError> {
        dmr::write(self.archive_path(patient, study, series), &Dmr::from(record))
    }

    /// Merge all archives under `<root>/<group>` into `<root>/<group>_totseg_auto.dmr.zip`, and
    /// write the `_long.csv` and `_wide.csv` projections next to it.
    ///
    /// Outputs are rebuilt from scratch on every call. Returns `None` when the group has no
    /// archives, in which case nothing is written.
    pub fn concatenate<P: AsRef<Path>>(
        root: P,
        group: &Group,
    ) -> Result<Option<CohortDataset>, ArchiveError> {
        let root = root.as_ref();
        let folder = root.join(group.relative_dir());
        if !folder.is_dir() {
            return Ok(None);
        }
        let archives = folder.find_dmrs().context(IOSnafu { path: &folder })?;
        if archives.is_empty() {
            return Ok(None);
        }
        info!("Concatenating {} archives of {}", archives.len(), group);

        let stem = root.join(format!("{}_{}", group.name(), COHORT_SUFFIX));
        let archive = stem.with_dmr_extension();
        let dmr = dmr::concat(&archives, &archive)?;

        let long = root.join(format!("{}_{}_long.csv", group.name(), COHORT_SUFFIX));
        let wide = root.join(format!("{}_{}_wide.csv", group.name(), COHORT_SUFFIX));
        dmr::write_long(&dmr, &long)?;
        dmr::write_wide(&dmr, &wide)?;

        Ok(Some(CohortDataset {
            archive,
            long,
            wide,
            dmr,
        }))
    }
}
