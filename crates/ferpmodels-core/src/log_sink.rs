//! Append-only per-run narrative log.
use crate::error::PipelineError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::warn;

pub const RECORD_PREFIX: &str = "*** ferpmodels: ";

/// Either a log file or nothing. Stage output goes to the same place.
#[derive(Debug, Clone)]
pub enum LogSink {
    Null,
    File(PathBuf),
}

impl LogSink {
    pub fn null() -> Self {
        LogSink::Null
    }

    /// Creates (or appends to) the log file.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PipelineError::io(format!("opening log file {}", path.display()), e))?;
        Ok(LogSink::File(path.to_path_buf()))
    }

    pub fn for_path(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            Some(path) => Self::open(path),
            None => Ok(Self::null()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LogSink::Null)
    }

    /// One prefixed narrative line.
    pub fn record(&self, msg: &str) {
        self.write_line(&format!("{}{}", RECORD_PREFIX, msg));
    }

    /// A bare prefix line, used to frame sections.
    pub fn blank(&self) {
        self.record("");
    }

    /// Prefixed section header framed by blank records.
    pub fn section(&self, title: &str) {
        self.blank();
        self.record(title);
        self.blank();
    }

    /// Verbatim text, e.g. captured tool output.
    pub fn append_raw(&self, text: &str) {
        self.write_line(text);
    }

    /// Where a stage's standard output should go.
    pub fn stdio(&self) -> Stdio {
        match self {
            LogSink::Null => Stdio::null(),
            LogSink::File(path) => match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Stdio::from(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "log file unavailable, discarding stage output");
                    Stdio::null()
                }
            },
        }
    }

    fn write_line(&self, line: &str) {
        let LogSink::File(path) = self else {
            return;
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write log record");
        }
    }
}
