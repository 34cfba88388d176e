//! Reading segmentation volumes from a folder of DICOM files.
//!
//! Series are identified the way the segmentation stage writes them: by
//! `(PatientID, StudyDescription, SeriesDescription)`. The series description of an
//! automatic segmentation is the task name (e.g. `total_mr`), an edited mask is
//! stored as `<organ>_edited`.

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject, OpenFileOptions};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption};
use indicatif::ParallelProgressIterator;
use itertools::Itertools;
use ndarray::{s, Array2, Array3};
use rayon::prelude::*;
use snafu::{OptionExt, Report, ResultExt};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::errors::volume::{
    ConvertValueSnafu, EmptySeriesSnafu, IOSnafu, InconsistentDimensionsSnafu,
    InvalidValueSnafu, MissingPropertySnafu, PixelDataSnafu, ReadSnafu,
};
use crate::errors::VolumeError;
use crate::file::{default_bar, DicomFileOperations};
use crate::volume::{cross, Affine, LabelVolume};

/// Location of one series in a DICOM folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCoordinates {
    pub root: PathBuf,
    pub patient: String,
    pub study: String,
    pub series: String,
    pub files: Vec<PathBuf>,
}

impl SeriesCoordinates {
    /// Identifier used to name per-series outputs: `{patient}_{study}_{series}`.
    pub fn id(&self) -> String {
        format!("{}_{}_{}", self.patient, self.study, self.series)
    }
}

impl fmt::Display for SeriesCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.patient, self.study, self.series)
    }
}

/// Provider of label volumes.
pub trait VolumeSource: Sync {
    /// List all series found under `dir`.
    fn series(&self, dir: &Path) -> Result<Vec<SeriesCoordinates>, VolumeError>;

    /// Load the label volume of one series.
    fn volume(&self, coords: &SeriesCoordinates) -> Result<LabelVolume, VolumeError>;
}

/// [`VolumeSource`] backed by DICOM files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomStore;

impl VolumeSource for DicomStore {
    fn series(&self, dir: &Path) -> Result<Vec<SeriesCoordinates>, VolumeError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let files = dir
            .find_dicoms_with_spinner()
            .context(IOSnafu { path: dir })?
            .collect::<Vec<_>>();

        let bar = default_bar(files.len() as u64);
        bar.set_message("Indexing DICOM series");
        let total = files.len();
        let headers = files
            .into_par_iter()
            .progress_with(bar)
            .filter_map(|path| match read_series_key(&path) {
                Ok(key) => Some((key, path)),
                Err(e) => {
                    error!("Skipping unreadable file: {}", Report::from_error(e));
                    None
                }
            })
            .collect::<Vec<_>>();
        if headers.len() < total {
            warn!(
                "Skipped {} of {} files in {}",
                total - headers.len(),
                total,
                dir.display()
            );
        }

        let series = headers
            .into_iter()
            .into_group_map()
            .into_iter()
            .map(|((patient, study, series), mut files)| {
                files.sort();
                SeriesCoordinates {
                    root: dir.to_path_buf(),
                    patient,
                    study,
                    series,
                    files,
                }
            })
            .sorted_by(|a, b| {
                a.patient
                    .cmp(&b.patient)
                    .then(a.study.cmp(&b.study))
                    .then(a.series.cmp(&b.series))
            })
            .collect::<Vec<_>>();

        info!("Found {} series in {}", series.len(), dir.display());
        Ok(series)
    }

    fn volume(&self, coords: &SeriesCoordinates) -> Result<LabelVolume, VolumeError> {
        let mut slices = coords
            .files
            .par_iter()
            .map(|path| Slice::read(path))
            .collect::<Result<Vec<_>, _>>()?;
        assemble(&coords.to_string(), &mut slices)
    }
}

fn read_string(obj: &DefaultDicomObject, tag: Tag, name: &'static str, path: &Path) -> Result<String, VolumeError> {
    Ok(obj
        .get(tag)
        .context(MissingPropertySnafu { name, path })?
        .to_str()
        .context(ConvertValueSnafu { name })?
        .trim()
        .to_string())
}

fn read_floats<const N: usize>(
    obj: &DefaultDicomObject,
    tag: Tag,
    name: &'static str,
    path: &Path,
) -> Result<[f64; N], VolumeError> {
    let values = obj
        .get(tag)
        .context(MissingPropertySnafu { name, path })?
        .to_multi_float64()
        .context(ConvertValueSnafu { name })?;
    <[f64; N]>::try_from(values.as_slice()).map_err(|_| VolumeError::InvalidValueError {
        name,
        value: format!("{values:?}"),
    })
}

fn read_optional_float(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.get(tag)
        .and_then(|e| e.to_float64().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn read_series_key(path: &Path) -> Result<(String, String, String), VolumeError> {
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .context(ReadSnafu { path })?;
    Ok((
        read_string(&obj, tags::PATIENT_ID, "Patient ID", path)?,
        read_string(&obj, tags::STUDY_DESCRIPTION, "Study Description", path)?,
        read_string(&obj, tags::SERIES_DESCRIPTION, "Series Description", path)?,
    ))
}

/// One decoded slice of a label series.
#[derive(Debug)]
struct Slice {
    row_direction: [f64; 3],
    column_direction: [f64; 3],
    position: [f64; 3],
    pixel_spacing: [f64; 2],
    spacing_between_slices: Option<f64>,
    labels: Array2<u16>,
}

impl Slice {
    fn read(path: &Path) -> Result<Self, VolumeError> {
        let obj = path.dcmread().context(ReadSnafu { path })?;
        let [r0, r1, r2, c0, c1, c2] =
            read_floats::<6>(&obj, tags::IMAGE_ORIENTATION_PATIENT, "Image Orientation Patient", path)?;
        let position = read_floats::<3>(&obj, tags::IMAGE_POSITION_PATIENT, "Image Position Patient", path)?;
        let pixel_spacing = read_floats::<2>(&obj, tags::PIXEL_SPACING, "Pixel Spacing", path)?;
        let spacing_between_slices = read_optional_float(&obj, tags::SPACING_BETWEEN_SLICES)
            .or_else(|| read_optional_float(&obj, tags::SLICE_THICKNESS));

        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::Default)
            .with_voi_lut(VoiLutOption::Identity);
        let values = obj
            .decode_pixel_data()
            .context(PixelDataSnafu { path })?
            .to_ndarray_with_options::<f32>(&options)
            .context(PixelDataSnafu { path })?;
        // The decoded array is (frame, row, column, sample); only the first frame and sample
        // of a label image are meaningful.
        let (_, rows, columns, samples) = values.dim();
        let frame = values
            .iter()
            .step_by(samples.max(1))
            .take(rows * columns)
            .map(|&value| {
                let rounded = value.round();
                if !rounded.is_finite() || rounded < 0.0 || rounded > u16::MAX as f32 {
                    return Err(VolumeError::LabelOutOfRange { value });
                }
                Ok(rounded as u16)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let labels = Array2::from_shape_vec((rows, columns), frame).map_err(|e| {
            VolumeError::InvalidValueError {
                name: "Pixel Data",
                value: format!("{} in {}", e, path.display()),
            }
        })?;

        Ok(Self {
            row_direction: [r0, r1, r2],
            column_direction: [c0, c1, c2],
            position,
            pixel_spacing,
            spacing_between_slices,
            labels,
        })
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Stack slices along the slice normal into a label volume.
fn assemble(series: &str, slices: &mut [Slice]) -> Result<LabelVolume, VolumeError> {
    let first = slices.first().context(EmptySeriesSnafu { series })?;
    let normal = cross(first.row_direction, first.column_direction);
    let dim = first.labels.dim();
    if let Some(other) = slices.iter().find(|s| s.labels.dim() != dim) {
        return InconsistentDimensionsSnafu {
            series,
            expected: dim,
            found: other.labels.dim(),
        }
        .fail();
    }

    slices.sort_by(|a, b| dot(a.position, normal).total_cmp(&dot(b.position, normal)));

    let first = &slices[0];
    let slice_spacing = match slices.len() {
        1 => first.spacing_between_slices.unwrap_or(1.0),
        n => {
            let start = dot(first.position, normal);
            let end = dot(slices[n - 1].position, normal);
            (end - start) / (n - 1) as f64
        }
    };
    if !(slice_spacing > 0.0) {
        return InvalidValueSnafu {
            name: "Image Position Patient",
            value: format!("duplicate slice positions in series {series}"),
        }
        .fail();
    }

    // Pixel Spacing is (row spacing, column spacing), i.e. (y, x)
    let spacing = [first.pixel_spacing[1], first.pixel_spacing[0], slice_spacing];
    let affine = Affine::from_dicom(
        first.row_direction,
        first.column_direction,
        first.position,
        spacing,
    );

    let (rows, columns) = dim;
    let mut labels = Array3::<u16>::zeros((slices.len(), rows, columns));
    for (k, slice) in slices.iter().enumerate() {
        labels.slice_mut(s![k, .., ..]).assign(&slice.labels);
    }
    Ok(LabelVolume::new(labels, spacing, affine))
}

fn strings<const N: usize>(values: [f64; N]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|v| format!("{v}")).collect())
}

fn unit(v: [f64; 3]) -> [f64; 3] {
    let norm = dot(v, v).sqrt();
    if norm == 0.0 {
        return v;
    }
    [v[0] / norm, v[1] / norm, v[2] / norm]
}

/// Write a label volume as a single-frame MR series under
/// `{dir}/{patient}/{study}/{series}/`. Existing files are overwritten.
pub fn write_series(
    dir: &Path,
    patient: &str,
    study: &str,
    series: &str,
    volume: &LabelVolume,
) -> Result<Vec<PathBuf>, VolumeError> {
    let folder = dir.join(patient).join(study).join(series);
    std::fs::create_dir_all(&folder).context(IOSnafu { path: &folder })?;

    let m = &volume.affine.0;
    let row_direction = unit([m[0][0], m[1][0], m[2][0]]);
    let column_direction = unit([m[0][1], m[1][1], m[2][1]]);
    let [sx, sy, sz] = volume.spacing;
    let (depth, rows, columns) = volume.labels.dim();
    let series_uid = format!("2.25.{}", uid_suffix(&[patient, study, series]));

    let mut paths = Vec::with_capacity(depth);
    for k in 0..depth {
        let sop_uid = format!("{series_uid}.{}", k + 1);
        let position = volume.affine.apply([0.0, 0.0, k as f64]);
        let pixels = volume
            .labels
            .slice(s![k, .., ..])
            .iter()
            .copied()
            .collect::<Vec<u16>>();

        let obj = InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::MR_IMAGE_STORAGE)),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop_uid.as_str())),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(patient)),
            DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from(study)),
            DataElement::new(tags::SERIES_DESCRIPTION, VR::LO, PrimitiveValue::from(series)),
            DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from(series_uid.as_str())),
            DataElement::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from(format!("{}", k + 1))),
            DataElement::new(tags::IMAGE_POSITION_PATIENT, VR::DS, strings(position)),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                strings([
                    row_direction[0],
                    row_direction[1],
                    row_direction[2],
                    column_direction[0],
                    column_direction[1],
                    column_direction[2],
                ]),
            ),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, strings([sy, sx])),
            DataElement::new(tags::SLICE_THICKNESS, VR::DS, strings([sz])),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
            DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows as u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns as u16)),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
            DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(pixels.into())),
        ]);

        let path = folder.join(format!("IM{:04}.dcm", k + 1));
        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::MR_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(sop_uid.as_str()),
            )
            .map_err(|e| VolumeError::Other {
                message: format!("unable to build file meta for {}: {e}", path.display()),
            })?;
        file.write_to_file(&path).map_err(|e| VolumeError::Other {
            message: format!("unable to write {}: {e}", path.display()),
        })?;
        paths.push(path);
    }
    Ok(paths)
}

fn uid_suffix(parts: &[&str]) -> u64 {
    // FNV-1a, keeps UIDs numeric and stable across runs
    parts
        .iter()
        .flat_map(|p| p.bytes().chain(std::iter::once(0)))
        .fold(0xcbf29ce484222325_u64, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(0x100000001b3)
        })
}
