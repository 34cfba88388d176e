use dicom::core::value::ConvertValueError;
use dicom::object::ReadError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VolumeError {
    #[snafu(display("IO error on {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("error reading DICOM file {}: {:?}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(ReadError, Box::new)))]
        source: Box<ReadError>,
    },

    #[snafu(display("missing DICOM property '{}' in {}", name, path.display()))]
    MissingPropertyError { name: &'static str, path: PathBuf },

    #[snafu(display("unable to convert DICOM property value '{}': {:?}", name, source))]
    ConvertValueError {
        name: &'static str,
        #[snafu(source(from(ConvertValueError, Box::new)))]
        source: Box<ConvertValueError>,
    },

    #[snafu(display("invalid DICOM property value '{}': {}", name, value))]
    InvalidValueError { name: &'static str, value: String },

    #[snafu(display("error decoding pixel data of {}: {:?}", path.display(), source))]
    PixelDataError {
        path: PathBuf,
        #[snafu(source(from(dicom::pixeldata::Error, Box::new)))]
        source: Box<dicom::pixeldata::Error>,
    },

    #[snafu(display("series {} contains no slices", series))]
    EmptySeries { series: String },

    #[snafu(display(
        "inconsistent slice dimensions in series {}: expected {:?}, found {:?}",
        series,
        expected,
        found
    ))]
    InconsistentDimensions {
        series: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[snafu(display("label value {} cannot be stored as an integer label", value))]
    LabelOutOfRange { value: f32 },

    #[snafu(display("{}", message))]
    Other { message: String },
}

