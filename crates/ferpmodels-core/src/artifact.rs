//! Scratch directory ownership and artifact persistence.
use crate::error::PipelineError;
use crate::run::Run;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files exchanged between stages inside the scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ExpandedCnf,
    ResolutionProof,
    BinaryProof,
    Trace,
    MergedCnf,
    /// The extracted strategy circuit, written straight to the output path.
    Certificate,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::ExpandedCnf => "cnf",
            ArtifactKind::ResolutionProof => "proof",
            ArtifactKind::BinaryProof => "proof2",
            ArtifactKind::Trace => "ferp",
            ArtifactKind::MergedCnf => "cnf2",
            ArtifactKind::Certificate => "aag",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::ExpandedCnf => "expanded CNF",
            ArtifactKind::ResolutionProof => "resolution proof",
            ArtifactKind::BinaryProof => "binary resolution proof",
            ArtifactKind::Trace => "FERP trace",
            ArtifactKind::MergedCnf => "merged CNF",
            ArtifactKind::Certificate => "certificate",
        }
    }

    pub fn scratch_name(self) -> String {
        format!("tmp.{}", self.extension())
    }

    /// Name used in keep directories.
    pub fn keep_name(self, run_id: &str) -> String {
        format!("{}.{}", run_id, self.extension())
    }

    /// Only the trace goes to the `--keep` directory.
    fn kept_in_trace_dir(self) -> bool {
        self == ArtifactKind::Trace
    }

    /// Lives in the scratch directory and may be persisted to keep dirs.
    pub fn is_intermediate(self) -> bool {
        self != ArtifactKind::Certificate
    }
}

/// Owns the per-run scratch directory from `prepare` to `finalize`.
#[derive(Debug)]
pub struct ArtifactStore {
    run_id: String,
    scratch_dir: PathBuf,
    keep_all: Option<PathBuf>,
    keep_trace: Option<PathBuf>,
    certificate: Option<PathBuf>,
    finalized: bool,
}

impl ArtifactStore {
    pub fn new(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            scratch_dir: run.scratch_dir.clone(),
            keep_all: run.keep_all.clone(),
            keep_trace: run.keep_trace.clone(),
            certificate: run.output.clone(),
            finalized: false,
        }
    }

    /// Creates the scratch directory. An existing directory is fine.
    pub fn prepare(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| {
            PipelineError::io(
                format!("creating scratch directory {}", self.scratch_dir.display()),
                e,
            )
        })?;
        debug!(run_id = %self.run_id, dir = %self.scratch_dir.display(), "scratch directory ready");
        Ok(())
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        match (kind, &self.certificate) {
            (ArtifactKind::Certificate, Some(output)) => output.clone(),
            _ => self.scratch_dir.join(kind.scratch_name()),
        }
    }

    pub fn exists(&self, kind: ArtifactKind) -> bool {
        self.path(kind).is_file()
    }

    pub fn is_nonempty(&self, kind: ArtifactKind) -> bool {
        std::fs::metadata(self.path(kind))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Whether a stage that declares `kind` as output really produced it.
    /// Scratch artifacts only need to exist, their consumers judge emptiness.
    /// The certificate leaves the run, so an empty one is a failed extraction.
    pub fn is_produced(&self, kind: ArtifactKind) -> bool {
        if kind.is_intermediate() {
            self.exists(kind)
        } else {
            self.is_nonempty(kind)
        }
    }

    /// True when the first line of the artifact has content. A solver that
    /// decides the formula on its own writes an empty expansion.
    pub fn first_line_nonempty(&self, kind: ArtifactKind) -> bool {
        let Ok(file) = std::fs::File::open(self.path(kind)) else {
            return false;
        };
        let mut line = String::new();
        match BufReader::new(file).read_line(&mut line) {
            Ok(n) => n > 0,
            Err(_) => false,
        }
    }

    /// Copies the artifact into every configured keep directory. Copy errors
    /// are logged and swallowed.
    pub fn offer(&self, kind: ArtifactKind) {
        let source = self.path(kind);
        if !kind.is_intermediate() || !source.is_file() {
            debug!(artifact = kind.label(), "nothing to persist");
            return;
        }

        let name = kind.keep_name(&self.run_id);
        let targets = [
            self.keep_all.as_ref(),
            self.keep_trace.as_ref().filter(|_| kind.kept_in_trace_dir()),
        ];
        for dir in targets.into_iter().flatten() {
            let target = dir.join(&name);
            match std::fs::copy(&source, &target) {
                Ok(bytes) => debug!(artifact = kind.label(), target = %target.display(), bytes, "artifact persisted"),
                Err(e) => warn!(artifact = kind.label(), target = %target.display(), error = %e, "failed to persist artifact"),
            }
        }
    }

    pub fn digest(&self, kind: ArtifactKind) -> Option<String> {
        let bytes = std::fs::read(self.path(kind)).ok()?;
        Some(format!("blake3:{}", blake3::hash(&bytes)))
    }

    /// Removes the scratch directory. Only the first call does anything.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Err(e) = std::fs::remove_dir_all(&self.scratch_dir) {
            debug!(dir = %self.scratch_dir.display(), error = %e, "scratch cleanup");
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        self.finalize();
    }
}
