use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::Snafu;
use std::path::PathBuf;
use zip::result::ZipError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArchiveError {
    #[snafu(display("IO error on archive {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("zip error on archive {}: {:?}", path.display(), source))]
    ZipError {
        path: PathBuf,
        #[snafu(source(from(ZipError, Box::new)))]
        source: Box<ZipError>,
    },

    #[snafu(display("CSV error on {}: {:?}", path.display(), source))]
    CsvError {
        path: PathBuf,
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
    },

    #[snafu(display("archive {} has no entry {}", path.display(), name))]
    MissingEntry { path: PathBuf, name: &'static str },

    #[snafu(display("table {} in {} has no column '{}'", table, path.display(), name))]
    MissingColumn {
        path: PathBuf,
        table: &'static str,
        name: String,
    },

    #[snafu(display("invalid value '{}' in {}", value, path.display()))]
    ParseValue {
        path: PathBuf,
        value: String,
        #[snafu(source(from(std::num::ParseFloatError, Box::new)))]
        source: Box<std::num::ParseFloatError>,
    },

    #[snafu(display(
        "parameter {} of subject {} / study {} is present in {} and another archive",
        parameter,
        subject,
        study,
        path.display()
    ))]
    DuplicateParameter {
        path: PathBuf,
        subject: String,
        study: String,
        parameter: String,
    },

    #[snafu(display("error moving temporary archive into place at {}", path.display()))]
    Persist {
        path: PathBuf,
        #[snafu(source(from(tempfile::PersistError, Box::new)))]
        source: Box<tempfile::PersistError>,
    },

    #[snafu(display("Arrow error: {:?}", source))]
    Arrow {
        #[snafu(source(from(ArrowError, Box::new)))]
        source: Box<ArrowError>,
    },

    #[snafu(display("Parquet error: {:?}", source))]
    Parquet {
        #[snafu(source(from(ParquetError, Box::new)))]
        source: Box<ParquetError>,
    },

    #[snafu(display("{}", message))]
    Other { message: String },
}

