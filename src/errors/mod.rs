pub mod archive;
pub mod volume;

pub use archive::ArchiveError;
pub use volume::VolumeError;

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClassMapError {
    #[snafu(display("unknown segmentation task: {}", name))]
    UnknownTask { name: String },

    #[snafu(display("organ '{}' is not part of task {}", organ, task))]
    UnknownOrgan { task: String, organ: String },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LogError {
    #[snafu(display("failed to open log file {}", path.display()))]
    OpenLogFile {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

/// Errors raised by a single feature back-end for a single region.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FeatureError {
    #[snafu(display("mask of region {} contains no voxels", region))]
    EmptyMask { region: String },

    #[snafu(display("degenerate geometry for region {}: {}", region, reason))]
    Degenerate { region: String, reason: String },

    #[snafu(display("{}", message))]
    Other { message: String },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MeasureError {
    #[snafu(display("class map error: {}", source))]
    ClassMap { source: ClassMapError },

    #[snafu(display("error listing series in {}: {}", path.display(), source))]
    ListSeries {
        path: PathBuf,
        #[snafu(source(from(VolumeError, Box::new)))]
        source: Box<VolumeError>,
    },

    #[snafu(display("error loading volume {}: {}", series, source))]
    LoadVolume {
        series: String,
        #[snafu(source(from(VolumeError, Box::new)))]
        source: Box<VolumeError>,
    },

    #[snafu(display("error saving results of {}: {}", series, source))]
    SaveArchive {
        series: String,
        #[snafu(source(from(ArchiveError, Box::new)))]
        source: Box<ArchiveError>,
    },

    #[snafu(display("error building cohort dataset in {}: {}", path.display(), source))]
    Concatenate {
        path: PathBuf,
        #[snafu(source(from(ArchiveError, Box::new)))]
        source: Box<ArchiveError>,
    },

    #[snafu(display("failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

impl From<ClassMapError> for MeasureError {
    fn from(source: ClassMapError) -> Self {
        Self::ClassMap { source }
    }
}
