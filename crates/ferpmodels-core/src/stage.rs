//! Stage descriptors: one tool invocation and how to read its result.
use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::config::Tool;
use crate::diagnostic::Diagnostic;
use crate::error::PipelineError;
use crate::machine::Phase;
use crate::run::Run;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// What the QBF solver decided about the input formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Sat,
    Unsat,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Sat => "sat",
            Verdict::Unsat => "unsat",
        }
    }

    /// Console wording for the QBF result.
    pub fn truth(self) -> &'static str {
        match self {
            Verdict::Sat => "TRUE",
            Verdict::Unsat => "FALSE",
        }
    }
}

/// Argument template, resolved against a run just before spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Lit(String),
    Input,
    Output,
    /// Scratch directory with a trailing separator.
    ScratchDir,
    Artifact(ArtifactKind),
    /// `prefix` glued to another argument, e.g. `--log_phi=<cnf>`.
    Prefixed(&'static str, Box<Arg>),
}

impl Arg {
    pub fn lit(s: &str) -> Self {
        Arg::Lit(s.to_string())
    }

    pub fn prefixed(prefix: &'static str, inner: Arg) -> Self {
        Arg::Prefixed(prefix, Box::new(inner))
    }

    pub fn resolve(&self, run: &Run, store: &ArtifactStore) -> Result<OsString, PipelineError> {
        Ok(match self {
            Arg::Lit(s) => OsString::from(s),
            Arg::Input => run.input.clone().into_os_string(),
            Arg::Output => run
                .output
                .clone()
                .ok_or_else(|| PipelineError::Config("no certificate output path".to_string()))?
                .into_os_string(),
            Arg::ScratchDir => {
                let mut dir = store.scratch_dir().to_path_buf().into_os_string();
                dir.push("/");
                dir
            }
            Arg::Artifact(kind) => store.path(*kind).into_os_string(),
            Arg::Prefixed(prefix, inner) => {
                let mut joined = OsString::from(prefix);
                joined.push(inner.resolve(run, store)?);
                joined
            }
        })
    }
}

/// Where a stage's standard output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutTarget {
    Log,
    /// Kept in memory for inspection, then appended to the log.
    Capture,
    /// The output *is* the artifact.
    Artifact(ArtifactKind),
    Discard,
}

/// Extra acceptance test on captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCheck {
    None,
    ResolutionSummary,
}

/// Exit status interpretation for a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPolicy {
    pub accept: Vec<(i32, Option<Verdict>)>,
    pub reject: Vec<(i32, Diagnostic)>,
    pub otherwise: Diagnostic,
}

impl ExitPolicy {
    /// Exit 0 succeeds, anything else fails with `otherwise`.
    pub fn zero(otherwise: Diagnostic) -> Self {
        Self {
            accept: vec![(0, None)],
            reject: Vec::new(),
            otherwise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Passed(Option<Verdict>),
    Failed(Diagnostic),
}

#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub phase: Phase,
    pub id: &'static str,
    /// Progress text; `{branch}` becomes `sat` or `unsat`.
    pub label: &'static str,
    /// Log section title and closing record.
    pub log_title: &'static str,
    pub log_done: &'static str,
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<Arg>,
    pub stdout: StdoutTarget,
    /// Discard standard error as well.
    pub quiet: bool,
    pub consumes: Vec<ArtifactKind>,
    pub produces: Vec<ArtifactKind>,
    pub policy: ExitPolicy,
    pub check: OutputCheck,
}

impl StageDescriptor {
    pub fn progress_label(&self, verdict: Option<Verdict>) -> String {
        let branch = verdict.map(Verdict::as_str).unwrap_or("unsat");
        self.label.replace("{branch}", branch)
    }

    pub fn resolve_args(&self, run: &Run, store: &ArtifactStore) -> Result<Vec<OsString>, PipelineError> {
        self.args.iter().map(|a| a.resolve(run, store)).collect()
    }

    /// Maps a finished tool onto pass/fail. `status` is `None` when the
    /// process died from a signal.
    pub fn interpret(
        &self,
        status: Option<i32>,
        captured: Option<&str>,
        verdict: Option<Verdict>,
    ) -> StageOutcome {
        let Some(status) = status else {
            return StageOutcome::Failed(self.policy.otherwise);
        };

        if let Some((_, diag)) = self.policy.reject.iter().find(|(code, _)| *code == status) {
            return StageOutcome::Failed(*diag);
        }

        let Some((_, decided)) = self.policy.accept.iter().find(|(code, _)| *code == status) else {
            return StageOutcome::Failed(self.policy.otherwise);
        };

        let output_ok = match self.check {
            OutputCheck::None => true,
            OutputCheck::ResolutionSummary => {
                crate::stages::tracecheck::summary_accepts(captured.unwrap_or(""), verdict)
            }
        };

        if output_ok {
            StageOutcome::Passed(*decided)
        } else {
            StageOutcome::Failed(self.policy.otherwise)
        }
    }
}
