//! Batch measurement of segmented images.
//!
//! Every image is measured independently: its label volume is loaded, its record is built and
//! saved as one archive. Images that already have an archive are skipped, so an interrupted
//! run resumes where it stopped. A failure leaves the image without archive and is retried
//! on the next run.

use std::fmt;
use std::path::PathBuf;

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use snafu::{Report, ResultExt};
use tracing::{debug, error, info, Dispatch};

use crate::class_map::Task;
use crate::dicom_store::{DicomStore, SeriesCoordinates, VolumeSource};
use crate::errors::{
    ConcatenateSnafu, CreateDirSnafu, ListSeriesSnafu, LoadVolumeSnafu, MeasureError,
    SaveArchiveSnafu,
};
use crate::file::default_bar;
use crate::layout::{Group, Layout, Stage, SITES};
use crate::record::RecordBuilder;
use crate::store::{CohortDataset, ResultStore};

/// Counts of images per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasureSummary {
    pub measured: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MeasureSummary {
    pub fn total(&self) -> usize {
        self.measured + self.skipped + self.failed
    }
}

impl std::ops::Add for MeasureSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            measured: self.measured + other.measured,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }
}

impl std::iter::Sum for MeasureSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |a, b| a + b)
    }
}

impl fmt::Display for MeasureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} measured, {} skipped, {} failed",
            self.measured, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Measured,
    Skipped,
    Failed,
}

impl From<Outcome> for MeasureSummary {
    fn from(outcome: Outcome) -> Self {
        let mut summary = Self::default();
        match outcome {
            Outcome::Measured => summary.measured = 1,
            Outcome::Skipped => summary.skipped = 1,
            Outcome::Failed => summary.failed = 1,
        }
        summary
    }
}

/// One measurement run over a group folder.
struct Job<'a> {
    input: PathBuf,
    store: ResultStore,
    series: String,
    organ: Option<&'a str>,
    builder: RecordBuilder,
}

/// Measurement context: where volumes come from, where log records go, and how failures
/// are handled.
pub struct Measurer<S: VolumeSource = DicomStore> {
    source: S,
    dispatch: Dispatch,
    strict: bool,
}

impl Measurer<DicomStore> {
    pub fn dicom(dispatch: Dispatch) -> Self {
        Self::new(DicomStore, dispatch)
    }
}

impl<S: VolumeSource> Measurer<S> {
    pub fn new(source: S, dispatch: Dispatch) -> Self {
        Self {
            source,
            dispatch,
            strict: false,
        }
    }

    /// In strict mode the first failing image aborts the run.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Measure all organs of the automated segmentations of a group.
    ///
    /// Reads series named after `task` from the segmentation stage and writes archives to the
    /// measurement stage. A patient group without site covers every site.
    pub fn all_organs(
        &self,
        layout: &Layout,
        group: &Group,
        task: Task,
    ) -> Result<MeasureSummary, MeasureError> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            sites(group)
                .iter()
                .map(|group| {
                    self.run(Job {
                        input: layout.group_dir(Stage::Segment, group),
                        store: ResultStore::new(layout.group_dir(Stage::Measure, group)),
                        series: task.name().to_string(),
                        organ: None,
                        builder: RecordBuilder::with_default_backends(task),
                    })
                })
                .sum()
        })
    }

    /// Measure one organ on manually edited masks, series `<organ>_edited` of the edit stage.
    pub fn edited_organ(
        &self,
        layout: &Layout,
        group: &Group,
        task: Task,
        organ: &str,
    ) -> Result<MeasureSummary, MeasureError> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            task.label_of(organ)?;
            sites(group)
                .iter()
                .map(|group| {
                    self.run(Job {
                        input: layout.group_dir(Stage::Edit, group),
                        store: ResultStore::new(layout.group_dir(Stage::EditedMeasure, group)),
                        series: format!("{}_edited", organ),
                        organ: Some(organ),
                        builder: RecordBuilder::with_default_backends(task),
                    })
                })
                .sum()
        })
    }

    /// Rebuild the cohort datasets of both groups in a measurement stage.
    pub fn concatenate(
        &self,
        layout: &Layout,
        stage: Stage,
    ) -> Result<Vec<CohortDataset>, MeasureError> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let root = layout.stage_dir(stage);
            let mut datasets = Vec::new();
            for group in Group::all() {
                if let Some(dataset) =
                    ResultStore::concatenate(&root, &group).context(ConcatenateSnafu { path: &root })?
                {
                    info!(
                        "Wrote {} values of {} to {}",
                        dataset.dmr.len(),
                        group,
                        dataset.archive.display()
                    );
                    datasets.push(dataset);
                }
            }
            Ok(datasets)
        })
    }

    fn run(&self, job: Job<'_>) -> Result<MeasureSummary, MeasureError> {
        let listed = self
            .source
            .series(&job.input)
            .context(ListSeriesSnafu { path: &job.input });
        let listed = match listed {
            Ok(listed) => listed,
            Err(e) if !self.strict => {
                // The folder stays unmeasured, other folders of the group proceed
                error!("{}", Report::from_error(&e));
                return Ok(MeasureSummary::default());
            }
            Err(e) => return Err(e),
        };
        let series = listed
            .into_iter()
            .filter(|coords| coords.series == job.series)
            .collect::<Vec<_>>();
        if series.is_empty() {
            debug!("No {} series in {}", job.series, job.input.display());
            return Ok(MeasureSummary::default());
        }

        let dir = job.store.dir();
        std::fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;

        let bar = default_bar(series.len() as u64);
        bar.set_message(format!("Measuring {}", job.series));
        let par_func = |coords: SeriesCoordinates| {
            tracing::dispatcher::with_default(&self.dispatch, || {
                self.measure_one(&job, &coords).map_err(|e| {
                    error!("Error measuring {}: {}", coords, Report::from_error(&e));
                    e
                })
            })
        };

        let summary: MeasureSummary = if self.strict {
            // In strict mode, abort on first error
            series
                .into_par_iter()
                .progress_with(bar)
                .map(par_func)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(MeasureSummary::from)
                .sum()
        } else {
            // In non-strict mode, only log errors and continue
            series
                .into_par_iter()
                .progress_with(bar)
                .map(|coords| par_func(coords).unwrap_or(Outcome::Failed))
                .map(MeasureSummary::from)
                .collect::<Vec<_>>()
                .into_iter()
                .sum()
        };
        info!("{}: {}", job.store.dir().display(), summary);
        Ok(summary)
    }

    fn measure_one(&self, job: &Job<'_>, coords: &SeriesCoordinates) -> Result<Outcome, MeasureError> {
        let (patient, study, series) = (&coords.patient, &coords.study, &coords.series);
        if job.store.exists(patient, study, series) {
            debug!("Skipping {}, already measured", coords);
            return Ok(Outcome::Skipped);
        }

        let volume = self
            .source
            .volume(coords)
            .context(LoadVolumeSnafu {
                series: coords.to_string(),
            })?;
        let record = job
            .builder
            .build(patient, study, series, &volume, job.organ)?;
        job.store
            .save(&record, patient, study, series)
            .context(SaveArchiveSnafu {
                series: coords.to_string(),
            })?;
        Ok(Outcome::Measured)
    }
}

/// A patient group without site expands to all sites.
fn sites(group: &Group) -> Vec<Group> {
    match group {
        Group::Patients { site: None } => SITES.iter().map(|site| Group::patients(site)).collect(),
        group => vec![group.clone()],
    }
}
