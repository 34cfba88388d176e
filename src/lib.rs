pub mod class_map;
pub mod dicom_store;
pub mod dmr;
pub mod errors;
pub mod export;
pub mod features;
pub mod file;
pub mod layout;
pub mod logging;
pub mod measure;
pub mod record;
pub mod store;
pub mod volume;

pub use class_map::{resolve, ClassMap, Task};
pub use dicom_store::{DicomStore, SeriesCoordinates, VolumeSource};
pub use dmr::Dmr;
pub use features::{default_backends, Feature, FeatureBackend, FeatureKey, Features};
pub use layout::{Group, Layout, Stage};
pub use logging::LogConfig;
pub use measure::{MeasureSummary, Measurer};
pub use record::{FeatureRecord, RecordBuilder};
pub use store::{CohortDataset, ResultStore};
pub use volume::{extract, Affine, LabelVolume, RegionMask};
