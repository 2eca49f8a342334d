//! FERP Models Core: coordinator for the QBF certification toolchain
//!
//! Sequences the external solver, proof checker and certificate tools,
//! hands artifacts between them, maps every failure to a stable exit code
//! and removes the per-run scratch directory on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use ferpmodels_core::{PipelineConfig, PipelineCoordinator, Run, TerminationHandler, ToolPaths};
//!
//! let termination = TerminationHandler::install()?;
//! let config = PipelineConfig::new(ToolPaths::resolve(None)?);
//! let run = Run::new(&config, "formula.qdimacs".as_ref(), Some("strategy.aag".as_ref()))?;
//! let outcome = PipelineCoordinator::new(config, run, termination).execute().await;
//! std::process::exit(outcome.exit_code() as i32);
//! ```

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod diagnostic;
pub mod error;
pub mod log_sink;
pub mod machine;
pub mod report;
pub mod run;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod termination;

pub use artifact::{ArtifactKind, ArtifactStore};
pub use config::{PipelineConfig, Tool, ToolPaths};
pub use coordinator::{PipelineCoordinator, RunOutcome};
pub use diagnostic::Diagnostic;
pub use error::PipelineError;
pub use log_sink::LogSink;
pub use machine::{transition, Phase, Step};
pub use report::{PhaseTimings, RunReport};
pub use run::Run;
pub use runner::{StageEnd, StageReport, StageRunner};
pub use stage::{StageDescriptor, StageOutcome, Verdict};
pub use termination::TerminationHandler;

/// Version of the coordinator
pub const FERPMODELS_VERSION: &str = env!("CARGO_PKG_VERSION");
