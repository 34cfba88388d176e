use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use snafu::ResultExt;
use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::FmtSubscriber;

use crate::errors::{LogError, OpenLogFileSnafu};

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Log file, appended to. Records are also written to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file: None,
        }
    }
}

impl LogConfig {
    pub fn new(level: Level, file: Option<PathBuf>) -> Self {
        Self { level, file }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the dispatcher described by this configuration.
    pub fn dispatch(&self) -> Result<Dispatch, LogError> {
        let builder = FmtSubscriber::builder().with_max_level(self.level);
        let dispatch = match &self.file {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).context(OpenLogFileSnafu { path })?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .context(OpenLogFileSnafu { path })?;
                Dispatch::new(
                    builder
                        .with_ansi(false)
                        .with_writer(std::io::stderr.and(Mutex::new(file)))
                        .finish(),
                )
            }
            None => Dispatch::new(builder.with_writer(std::io::stderr).finish()),
        };
        Ok(dispatch)
    }
}
