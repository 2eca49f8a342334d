//! Unified Error Model
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("CONFIG/{0}")]
    Config(String),

    #[error("IO/{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DEPENDENCY/{tool} not found or not executable at {}", path.display())]
    DependencyMissing { tool: &'static str, path: PathBuf },

    #[error("SIGNAL/{0}")]
    Signal(String),

    #[error("REPORT/{0}")]
    Report(String),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
