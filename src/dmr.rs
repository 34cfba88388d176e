//! Result archives.
//!
//! A result archive is a zip file with the suffix `.dmr.zip` holding two CSV tables:
//!
//! * `data.csv` with one row per parameter: `parameter,description,unit,type`, followed by
//!   the archive's extra columns (by default `body_part,biomarker_category,biomarker`).
//! * `pars.csv` with one row per measured value: `subject,study,parameter,value`.
//!
//! Archives are written to a temporary file in the target directory and moved into place,
//! so a reader never observes a partially written archive.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use snafu::{OptionExt, ResultExt};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::archive::*;
use crate::features::FeatureKey;
use crate::file::DmrFileOperations;

pub const DATA_ENTRY: &str = "data.csv";
pub const PARS_ENTRY: &str = "pars.csv";

/// Extra columns of the `data` table in a freshly measured archive.
pub const DEFAULT_COLUMNS: [&str; 3] = ["body_part", "biomarker_category", "biomarker"];

const DATA_HEADER: [&str; 4] = ["parameter", "description", "unit", "type"];
const PARS_HEADER: [&str; 4] = ["subject", "study", "parameter", "value"];

/// Metadata of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub description: String,
    pub unit: String,
    pub value_type: String,
    /// Values of the archive's extra columns, in the order of [`Dmr::columns`].
    pub extra: Vec<String>,
}

/// In-memory contents of a result archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dmr {
    pub data: BTreeMap<String, ParameterInfo>,
    pub pars: BTreeMap<(String, String, String), f64>,
    pub columns: Vec<String>,
}

impl Dmr {
    /// Number of measured values.
    pub fn len(&self) -> usize {
        self.pars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pars.is_empty()
    }

    /// Distinct `(subject, study)` pairs, sorted.
    pub fn subjects(&self) -> BTreeSet<(&str, &str)> {
        self.pars
            .keys()
            .map(|(subject, study, _)| (subject.as_str(), study.as_str()))
            .collect()
    }

    /// Distinct parameters with at least one value, sorted.
    pub fn parameters(&self) -> BTreeSet<&str> {
        self.pars
            .keys()
            .map(|(_, _, parameter)| parameter.as_str())
            .collect()
    }

    /// Value of an extra column for a parameter.
    pub fn extra(&self, parameter: &str, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.data
            .get(parameter)
            .and_then(|info| info.extra.get(index))
            .map(String::as_str)
    }

    /// Insert an extra column holding the same value for every parameter.
    pub fn insert_column(&mut self, index: usize, name: &str, value: &str) {
        let index = index.min(self.columns.len());
        self.columns.insert(index, name.to_string());
        for info in self.data.values_mut() {
            let at = index.min(info.extra.len());
            info.extra.insert(at, value.to_string());
        }
    }

    /// Body part of a parameter, from the `body_part` column or else from the parameter name.
    pub fn body_part(&self, parameter: &str) -> Option<String> {
        self.extra(parameter, "body_part")
            .map(str::to_string)
            .or_else(|| FeatureKey::parse(parameter).map(|key| key.body_part))
    }

    /// Remove all parameters of the given body parts. Returns the number of removed values.
    pub fn drop_body_parts(&mut self, names: &[&str]) -> usize {
        let dropped = self
            .data
            .keys()
            .chain(self.pars.keys().map(|(_, _, p)| p))
            .filter(|p| {
                self.body_part(p)
                    .is_some_and(|part| names.contains(&part.as_str()))
            })
            .cloned()
            .collect::<BTreeSet<_>>();
        self.data.retain(|p, _| !dropped.contains(p));
        let before = self.pars.len();
        self.pars.retain(|(_, _, p), _| !dropped.contains(p));
        before - self.pars.len()
    }

    /// Map subject and study identifiers, e.g. to harmonize them for export.
    pub fn map_subjects<F>(&mut self, mut f: F)
    where
        F: FnMut(&str, &str) -> (String, String),
    {
        self.pars = std::mem::take(&mut self.pars)
            .into_iter()
            .map(|((subject, study, parameter), value)| {
                let (subject, study) = f(&subject, &study);
                ((subject, study, parameter), value)
            })
            .collect();
    }
}

fn write_tables<W: Write + Seek>(writer: W, dmr: &Dmr, path: &Path) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    zip.start_file(DATA_ENTRY, options)
        .context(ZipSnafu { path })?;
    {
        let mut csv = csv::Writer::from_writer(&mut zip);
        csv.write_record(DATA_HEADER.iter().copied().chain(dmr.columns.iter().map(String::as_str)))
            .context(CsvSnafu { path })?;
        for (parameter, info) in dmr.data.iter() {
            let row = [
                parameter.as_str(),
                info.description.as_str(),
                info.unit.as_str(),
                info.value_type.as_str(),
            ];
            csv.write_record(row.into_iter().chain(info.extra.iter().map(String::as_str)))
                .context(CsvSnafu { path })?;
        }
        csv.flush().context(IOSnafu { path })?;
    }

    zip.start_file(PARS_ENTRY, options)
        .context(ZipSnafu { path })?;
    {
        let mut csv = csv::Writer::from_writer(&mut zip);
        csv.write_record(PARS_HEADER).context(CsvSnafu { path })?;
        for ((subject, study, parameter), value) in dmr.pars.iter() {
            csv.write_record([subject, study, parameter, &value.to_string()])
                .context(CsvSnafu { path })?;
        }
        csv.flush().context(IOSnafu { path })?;
    }

    zip.finish().context(ZipSnafu { path })?;
    Ok(())
}

/// Write an archive. The `.dmr.zip` suffix is appended to `path` when missing.
///
/// Either the complete archive is moved into place or the destination is left untouched.
/// Returns the path of the written archive.
pub fn write<P: AsRef<Path>>(path: P, dmr: &Dmr) -> Result<PathBuf, ArchiveError> {
    let path = path.as_ref().with_dmr_extension();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).context(IOSnafu { path: &parent })?;

    let mut tmp = NamedTempFile::new_in(&parent).context(IOSnafu { path: &parent })?;
    write_tables(tmp.as_file_mut(), dmr, &path)?;
    tmp.as_file_mut().flush().context(IOSnafu { path: &path })?;
    tmp.persist(&path).context(PersistSnafu { path: &path })?;
    Ok(path)
}

fn read_table(
    archive: &mut ZipArchive<File>,
    path: &Path,
    name: &'static str,
) -> Result<(csv::StringRecord, Vec<csv::StringRecord>), ArchiveError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return MissingEntrySnafu { path, name }.fail(),
        Err(e) => return Err(e).context(ZipSnafu { path }),
    };
    let mut reader = csv::Reader::from_reader(entry);
    let header = reader.headers().context(CsvSnafu { path })?.clone();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .context(CsvSnafu { path })?;
    Ok((header, rows))
}

fn column_index(
    header: &csv::StringRecord,
    path: &Path,
    table: &'static str,
    name: &str,
) -> Result<usize, ArchiveError> {
    header.iter().position(|h| h == name).context(MissingColumnSnafu {
        path,
        table,
        name,
    })
}

/// Read an archive. The `.dmr.zip` suffix is appended to `path` when missing.
pub fn read<P: AsRef<Path>>(path: P) -> Result<Dmr, ArchiveError> {
    let path = path.as_ref().with_dmr_extension();
    let file = File::open(&path).context(IOSnafu { path: &path })?;
    let mut archive = ZipArchive::new(file).context(ZipSnafu { path: &path })?;

    let (header, rows) = read_table(&mut archive, &path, DATA_ENTRY)?;
    let index = DATA_HEADER
        .iter()
        .map(|name| column_index(&header, &path, DATA_ENTRY, name))
        .collect::<Result<Vec<_>, _>>()?;
    let extra = (0..header.len())
        .filter(|i| !index.contains(i))
        .collect::<Vec<_>>();

    let mut dmr = Dmr {
        columns: extra.iter().map(|&i| header[i].to_string()).collect(),
        ..Default::default()
    };
    for row in rows.iter() {
        let field = |i: usize| row.get(i).unwrap_or_default().to_string();
        dmr.data.insert(
            field(index[0]),
            ParameterInfo {
                description: field(index[1]),
                unit: field(index[2]),
                value_type: field(index[3]),
                extra: extra.iter().map(|&i| field(i)).collect(),
            },
        );
    }

    let (header, rows) = read_table(&mut archive, &path, PARS_ENTRY)?;
    let index = PARS_HEADER
        .iter()
        .map(|name| column_index(&header, &path, PARS_ENTRY, name))
        .collect::<Result<Vec<_>, _>>()?;
    for row in rows.iter() {
        let field = |i: usize| row.get(i).unwrap_or_default();
        let value = field(index[3]);
        let value = value.trim().parse::<f64>().context(ParseValueSnafu {
            path: &path,
            value,
        })?;
        dmr.pars.insert(
            (
                field(index[0]).to_string(),
                field(index[1]).to_string(),
                field(index[2]).to_string(),
            ),
            value,
        );
    }
    Ok(dmr)
}

/// Merge archives into one and write it to `out`.
///
/// Parameter metadata is merged with later archives taking precedence. The same
/// `(subject, study, parameter)` occurring in two archives is an error.
pub fn concat<P: AsRef<Path>, Q: AsRef<Path>>(paths: &[P], out: Q) -> Result<Dmr, ArchiveError> {
    let mut merged = Dmr::default();
    for (i, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let dmr = read(path)?;
        if i == 0 {
            merged.columns = dmr.columns.clone();
        } else if dmr.columns != merged.columns && !dmr.data.is_empty() {
            return OtherSnafu {
                message: format!(
                    "archive {} has columns {:?}, expected {:?}",
                    path.display(),
                    dmr.columns,
                    merged.columns
                ),
            }
            .fail();
        }
        merged.data.extend(dmr.data);
        for (key, value) in dmr.pars {
            if merged.pars.contains_key(&key) {
                let (subject, study, parameter) = key;
                return DuplicateParameterSnafu {
                    path,
                    subject,
                    study,
                    parameter,
                }
                .fail();
            }
            merged.pars.insert(key, value);
        }
    }
    write(out, &merged)?;
    Ok(merged)
}

fn long_header(dmr: &Dmr) -> Vec<&str> {
    ["subject", "study", "parameter", "description", "value", "unit", "type"]
        .into_iter()
        .chain(dmr.columns.iter().map(String::as_str))
        .collect()
}

/// Write the long table: one row per measured value with its parameter metadata.
pub fn write_long<P: AsRef<Path>>(dmr: &Dmr, csv_path: P) -> Result<(), ArchiveError> {
    let csv_path = csv_path.as_ref();
    let mut csv = csv::Writer::from_path(csv_path).context(CsvSnafu { path: csv_path })?;
    csv.write_record(long_header(dmr))
        .context(CsvSnafu { path: csv_path })?;

    let empty = ParameterInfo {
        description: String::new(),
        unit: String::new(),
        value_type: String::new(),
        extra: vec![String::new(); dmr.columns.len()],
    };
    for ((subject, study, parameter), value) in dmr.pars.iter() {
        let info = dmr.data.get(parameter).unwrap_or(&empty);
        let value = value.to_string();
        let row = [
            subject.as_str(),
            study.as_str(),
            parameter.as_str(),
            info.description.as_str(),
            value.as_str(),
            info.unit.as_str(),
            info.value_type.as_str(),
        ];
        csv.write_record(row.into_iter().chain(info.extra.iter().map(String::as_str)))
            .context(CsvSnafu { path: csv_path })?;
    }
    csv.flush().context(IOSnafu { path: csv_path })?;
    Ok(())
}

/// Write the wide table: one row per `(subject, study)`, one column per parameter.
/// Columns are named by the full parameter string `body_part-category-biomarker` (e.g.
/// `liver-shape_ski-volume`), so the same biomarker of two organs never collides. Missing
/// values are left empty.
pub fn write_wide<P: AsRef<Path>>(dmr: &Dmr, csv_path: P) -> Result<(), ArchiveError> {
    let csv_path = csv_path.as_ref();
    let parameters = dmr.parameters();
    let mut csv = csv::Writer::from_path(csv_path).context(CsvSnafu { path: csv_path })?;
    csv.write_record(["subject", "study"].into_iter().chain(parameters.iter().copied()))
        .context(CsvSnafu { path: csv_path })?;

    for (subject, study) in dmr.subjects() {
        let values = parameters.iter().map(|parameter| {
            dmr.pars
                .get(&(subject.to_string(), study.to_string(), parameter.to_string()))
                .map(|v| v.to_string())
                .unwrap_or_default()
        });
        let row = [subject.to_string(), study.to_string()]
            .into_iter()
            .chain(values)
            .collect::<Vec<_>>();
        csv.write_record(&row).context(CsvSnafu { path: csv_path })?;
    }
    csv.flush().context(IOSnafu { path: csv_path })?;
    Ok(())
}

/// Write the long table of an archive as CSV.
pub fn pars_to_long<P: AsRef<Path>, Q: AsRef<Path>>(path: P, csv: Q) -> Result<(), ArchiveError> {
    write_long(&read(path)?, csv)
}

/// Write the wide table of an archive as CSV.
pub fn pars_to_wide<P: AsRef<Path>, Q: AsRef<Path>>(path: P, csv: Q) -> Result<(), ArchiveError> {
    write_wide(&read(path)?, csv)
}

/// Write the long table of an archive as Parquet.
pub fn pars_to_parquet<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    parquet: Q,
) -> Result<(), ArchiveError> {
    let dmr = read(path)?;
    let parquet = parquet.as_ref();

    let info = |parameter: &String| dmr.data.get(parameter);
    let text = |f: &dyn Fn(&(String, String, String)) -> String| -> ArrayRef {
        Arc::new(StringArray::from(dmr.pars.keys().map(f).collect::<Vec<_>>()))
    };

    let mut fields = vec![
        Field::new("subject", DataType::Utf8, false),
        Field::new("study", DataType::Utf8, false),
        Field::new("parameter", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("unit", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        text(&|(s, _, _)| s.clone()),
        text(&|(_, s, _)| s.clone()),
        text(&|(_, _, p)| p.clone()),
        text(&|(_, _, p)| info(p).map(|i| i.description.clone()).unwrap_or_default()),
        Arc::new(Float64Array::from(dmr.pars.values().copied().collect::<Vec<_>>())),
        text(&|(_, _, p)| info(p).map(|i| i.unit.clone()).unwrap_or_default()),
        text(&|(_, _, p)| info(p).map(|i| i.value_type.clone()).unwrap_or_default()),
    ];
    for (index, name) in dmr.columns.iter().enumerate() {
        fields.push(Field::new(name, DataType::Utf8, false));
        columns.push(text(&|(_, _, p)| {
            info(p)
                .and_then(|i| i.extra.get(index).cloned())
                .unwrap_or_default()
        }));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu)?;
    let file = File::create(parquet).context(IOSnafu { path: parquet })?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context(ParquetSnafu)?;
    writer.write(&batch).context(ParquetSnafu)?;
    writer.close().context(ParquetSnafu)?;
    Ok(())
}

/// Rename header columns of a CSV file in place.
pub fn rename_columns<P: AsRef<Path>>(
    csv_path: P,
    names: &HashMap<&str, &str>,
) -> Result<(), ArchiveError> {
    let csv_path = csv_path.as_ref();
    let mut reader = csv::Reader::from_path(csv_path).context(CsvSnafu { path: csv_path })?;
    let header = reader
        .headers()
        .context(CsvSnafu { path: csv_path })?
        .iter()
        .map(|h| names.get(h).copied().unwrap_or(h).to_string())
        .collect::<Vec<_>>();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .context(CsvSnafu { path: csv_path })?;

    let parent = csv_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let tmp = NamedTempFile::new_in(parent).context(IOSnafu { path: parent })?;
    {
        let mut csv = csv::Writer::from_writer(tmp.as_file());
        csv.write_record(&header)
            .context(CsvSnafu { path: csv_path })?;
        for row in rows.iter() {
            csv.write_record(row).context(CsvSnafu { path: csv_path })?;
        }
        csv.flush().context(IOSnafu { path: csv_path })?;
    }
    tmp.persist(csv_path)
        .context(PersistSnafu { path: csv_path })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Read;
    use tempfile::TempDir;

    fn key(subject: &str, study: &str, parameter: &str) -> (String, String, String) {
        (subject.to_string(), study.to_string(), parameter.to_string())
    }

    /// Archive with a single liver volume measurement.
    fn liver_dmr(subject: &str, value: f64) -> Dmr {
        let mut dmr = Dmr {
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        };
        dmr.data.insert(
            "liver-volume-size".to_string(),
            ParameterInfo {
                description: "Liver volume".to_string(),
                unit: "mL".to_string(),
                value_type: "float".to_string(),
                extra: vec!["liver".into(), "volume".into(), "size".into()],
            },
        );
        dmr.pars.insert(key(subject, "Baseline", "liver-volume-size"), value);
        dmr
    }

    fn read_csv(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_write_read() {
        let dir = TempDir::new().unwrap();
        let mut dmr = liver_dmr("001", 120.5);
        dmr.data.insert(
            "spleen-shape_ski-voxel_count".to_string(),
            ParameterInfo {
                description: "Number of voxels".to_string(),
                unit: String::new(),
                value_type: "int".to_string(),
                extra: vec!["spleen".into(), "shape_ski".into(), "voxel_count".into()],
            },
        );
        dmr.pars
            .insert(key("001", "Baseline", "spleen-shape_ski-voxel_count"), 1234.0);

        let path = write(dir.path().join("nested").join("001_Baseline_total_mr"), &dmr).unwrap();
        assert_eq!(
            path,
            dir.path().join("nested").join("001_Baseline_total_mr.dmr.zip")
        );
        assert_eq!(read(&path).unwrap(), dmr);
    }

    #[test]
    fn test_write_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let dmr = liver_dmr("001", 120.5);
        let a = write(dir.path().join("a"), &dmr).unwrap();
        let b = write(dir.path().join("b"), &dmr).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn test_write_failure_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        // The parent "directory" is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let result = write(blocker.join("x"), &liver_dmr("001", 1.0));
        assert!(result.is_err());
        assert!(!blocker.join("x.dmr.zip").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.dmr.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            zip.start_file(DATA_ENTRY, SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"parameter,description,unit,type\n").unwrap();
            zip.finish().unwrap();
        }
        let err = read(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry { name, .. } if name == PARS_ENTRY));
    }

    #[test]
    fn test_concat_two_subjects() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path().join("001_Baseline_total_mr"), &liver_dmr("001", 120.5)).unwrap();
        let b = write(dir.path().join("002_Baseline_total_mr"), &liver_dmr("002", 98.2)).unwrap();

        let out = dir.path().join("Controls_totseg_auto");
        let merged = concat(&[a, b], &out).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.data.len(), 1);
        assert_eq!(read(&out).unwrap(), merged);

        let wide = dir.path().join("wide.csv");
        pars_to_wide(&out, &wide).unwrap();
        assert_eq!(
            read_csv(&wide),
            vec![
                vec!["subject", "study", "liver-volume-size"],
                vec!["001", "Baseline", "120.5"],
                vec!["002", "Baseline", "98.2"],
            ]
        );

        let long = dir.path().join("long.csv");
        pars_to_long(&out, &long).unwrap();
        let rows = read_csv(&long);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            vec![
                "subject",
                "study",
                "parameter",
                "description",
                "value",
                "unit",
                "type",
                "body_part",
                "biomarker_category",
                "biomarker"
            ]
        );
        assert_eq!(
            rows[2],
            vec![
                "002",
                "Baseline",
                "liver-volume-size",
                "Liver volume",
                "98.2",
                "mL",
                "float",
                "liver",
                "volume",
                "size"
            ]
        );
    }

    #[test]
    fn test_concat_duplicate_parameter() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path().join("a"), &liver_dmr("001", 120.5)).unwrap();
        let b = write(dir.path().join("b"), &liver_dmr("001", 99.0)).unwrap();
        let err = concat(&[a, b.clone()], dir.path().join("out")).unwrap_err();
        assert!(
            matches!(err, ArchiveError::DuplicateParameter { path, subject, .. } if path == b && subject == "001")
        );
    }

    #[test]
    fn test_concat_is_a_rebuild() {
        let dir = TempDir::new().unwrap();
        let inputs = [
            write(dir.path().join("a"), &liver_dmr("001", 120.5)).unwrap(),
            write(dir.path().join("b"), &liver_dmr("002", 98.2)).unwrap(),
        ];
        let out = dir.path().join("out");
        let mut outputs = Vec::new();
        for _ in 0..2 {
            concat(&inputs, &out).unwrap();
            pars_to_long(&out, dir.path().join("long.csv")).unwrap();
            pars_to_wide(&out, dir.path().join("wide.csv")).unwrap();
            outputs.push(
                ["out.dmr.zip", "long.csv", "wide.csv"]
                    .map(|name| std::fs::read(dir.path().join(name)).unwrap()),
            );
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_wide_leaves_missing_values_empty() {
        let dir = TempDir::new().unwrap();
        let mut dmr = liver_dmr("001", 120.5);
        dmr.pars.insert(key("002", "Followup", "spleen-volume-size"), 80.0);
        let wide = dir.path().join("wide.csv");
        write_wide(&dmr, &wide).unwrap();
        assert_eq!(
            read_csv(&wide),
            vec![
                vec!["subject", "study", "liver-volume-size", "spleen-volume-size"],
                vec!["001", "Baseline", "120.5", ""],
                vec!["002", "Followup", "", "80"],
            ]
        );
    }

    #[rstest]
    #[case::listed(vec!["liver"], 1, 1)]
    #[case::unlisted(vec!["heart", "prostate"], 0, 2)]
    fn test_drop_body_parts(
        #[case] names: Vec<&str>,
        #[case] dropped: usize,
        #[case] remaining: usize,
    ) {
        let mut dmr = liver_dmr("001", 120.5);
        dmr.pars.insert(key("001", "Baseline", "spleen-volume-size"), 80.0);
        assert_eq!(dmr.drop_body_parts(&names), dropped);
        assert_eq!(dmr.len(), remaining);
        if dropped > 0 {
            assert!(dmr.data.is_empty());
        }
    }

    #[test]
    fn test_insert_column() {
        let mut dmr = liver_dmr("001", 120.5);
        dmr.insert_column(1, "image", "mask");
        assert_eq!(dmr.columns, vec!["body_part", "image", "biomarker_category", "biomarker"]);
        assert_eq!(dmr.extra("liver-volume-size", "image"), Some("mask"));
        assert_eq!(dmr.extra("liver-volume-size", "biomarker"), Some("size"));
    }

    #[test]
    fn test_rename_columns() {
        let dir = TempDir::new().unwrap();
        let long = dir.path().join("long.csv");
        write_long(&liver_dmr("001", 120.5), &long).unwrap();
        let names = HashMap::from([("subject", "harmonized_id"), ("value", "result")]);
        rename_columns(&long, &names).unwrap();

        let rows = read_csv(&long);
        assert_eq!(rows[0][0], "harmonized_id");
        assert_eq!(rows[0][4], "result");
        assert_eq!(rows[1][0], "001");
    }

    #[test]
    fn test_pars_to_parquet() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path().join("a"), &liver_dmr("001", 120.5)).unwrap();
        let out = dir.path().join("long.parquet");
        pars_to_parquet(&a, &out).unwrap();

        let file = File::open(&out).unwrap();
        let reader =
            parquet::arrow::arrow_reader::ParquetRecordBatchReader::try_new(file, 1024).unwrap();
        let batch = reader.into_iter().next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
        for field in ["subject", "study", "parameter", "value", "body_part"] {
            assert!(batch.schema().field_with_name(field).is_ok());
        }
    }

    #[test]
    fn test_archive_entries_are_deflated() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path().join("a"), &liver_dmr("001", 120.5)).unwrap();
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(PARS_ENTRY).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "subject,study,parameter,value\n001,Baseline,liver-volume-size,120.5\n");
    }
}
