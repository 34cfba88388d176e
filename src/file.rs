use dicom::object::open_file;
use dicom::object::DefaultDicomObject;
use dicom::object::ReadError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rust_search::SearchBuilder;

pub const DICM_PREFIX: &[u8; 4] = b"DICM";
pub const DICM_PREFIX_LOCATION: u64 = 128;
pub const DMR_SUFFIX: &str = ".dmr.zip";

const DICOM_EXTENSIONS: [&str; 4] = ["dcm", "dicom", "DCM", "DICOM"];

type IOResult<T> = Result<T, std::io::Error>;

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap(),
    );
    pb
}

pub fn default_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    spinner
}

/// All regular files below `dir`, recursively.
fn walk(dir: &Path) -> IOResult<impl Iterator<Item = PathBuf>> {
    if !dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a directory", dir.display()),
        ));
    }
    Ok(SearchBuilder::default()
        .location(dir)
        .build()
        .map(PathBuf::from)
        .filter(|path| path.is_file()))
}

/// Whether the 128 byte preamble of `path` is followed by `DICM`. Unreadable or short
/// files are not DICOM.
fn has_dicm_preamble(path: &Path) -> bool {
    let mut buffer = [0; DICM_PREFIX.len()];
    File::open(path)
        .and_then(|mut reader| {
            reader.seek(SeekFrom::Start(DICM_PREFIX_LOCATION))?;
            reader.read_exact(&mut buffer)
        })
        .is_ok_and(|_| &buffer == DICM_PREFIX)
}

pub trait DicomFileOperations
where
    Self: AsRef<Path>,
{
    /// Segmentation exports either carry a DICOM extension or none at all, in which case the
    /// preamble is checked. Files with any other extension are skipped.
    fn is_dicom_file(&self) -> bool {
        let path = self.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => DICOM_EXTENSIONS.contains(&ext),
            None => has_dicm_preamble(path),
        }
    }

    fn find_dicoms(&self) -> IOResult<impl Iterator<Item = PathBuf>> {
        Ok(walk(self.as_ref())?.filter(|file| file.is_dicom_file()))
    }

    fn find_dicoms_with_spinner(&self) -> IOResult<impl Iterator<Item = PathBuf>> {
        let spinner = default_spinner();
        spinner.set_message("Searching for DICOM files");
        Ok(self.find_dicoms()?.inspect(move |_| spinner.tick()))
    }

    fn dcmread(&self) -> Result<DefaultDicomObject, ReadError> {
        open_file(self.as_ref())
    }
}

impl<P: AsRef<Path>> DicomFileOperations for P {}

pub trait DmrFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a path ends in `.dmr.zip`.
    fn has_dmr_extension(&self) -> bool {
        self.as_ref()
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(DMR_SUFFIX))
            .unwrap_or(false)
    }

    /// Append `.dmr.zip` to a path stem, unless it is already present.
    fn with_dmr_extension(&self) -> PathBuf {
        let path = self.as_ref();
        if self.has_dmr_extension() {
            return path.to_path_buf();
        }
        let mut name = path.as_os_str().to_os_string();
        name.push(DMR_SUFFIX);
        PathBuf::from(name)
    }

    /// Find all result archives in a directory tree, sorted by path.
    fn find_dmrs(&self) -> IOResult<Vec<PathBuf>> {
        let mut result = walk(self.as_ref())?
            .filter(|file| file.has_dmr_extension())
            .collect::<Vec<_>>();
        result.sort();
        Ok(result)
    }
}

impl<P: AsRef<Path>> DmrFileOperations for P {}
