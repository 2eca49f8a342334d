//! Data Model: timings and the JSON run report
use crate::artifact::ArtifactKind;
use crate::diagnostic::Diagnostic;
use crate::error::PipelineError;
use crate::machine::Phase;
use crate::stage::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The four measured spans. Missing entries were never reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// QBF solver.
    pub solver: Option<f64>,
    /// From the SAT re-solve through the end of trace production.
    pub generation: Option<f64>,
    /// Trace merge alone.
    pub to_ferp: Option<f64>,
    /// Trace validation alone.
    pub ferp_check: Option<f64>,
}

impl PhaseTimings {
    pub fn secs(d: Duration) -> f64 {
        d.as_secs_f64()
    }

    /// `Label:      1.234567 s` lines, in reporting order.
    pub fn lines(&self) -> Vec<String> {
        [
            ("Solver:", self.solver),
            ("Generation:", self.generation),
            ("ToFerp:", self.to_ferp),
            ("FerpCheck:", self.ferp_check),
        ]
        .into_iter()
        .map(|(label, secs)| format!("{:<13}{:.6} s", label, secs.unwrap_or(0.0)))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub phase: Phase,
    /// Tool exit status; absent when the tool was stopped or crashed.
    pub status: Option<i32>,
    pub latency_ms: u64,
    pub artifacts: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub input: PathBuf,
    pub formula: String,
    pub output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub verdict: Option<Verdict>,
    pub diagnostic: Diagnostic,
    pub exit_code: u8,
    /// Last phase entered before the run ended.
    pub last_phase: Phase,
    pub timings: PhaseTimings,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| PipelineError::Report(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| PipelineError::io(format!("writing report {}", path.display()), e))
    }
}
