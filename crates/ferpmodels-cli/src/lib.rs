//! ferpmodels: command-line surface of the FERP certification pipeline
use anyhow::{Context, Result};
use clap::Parser;
use ferpmodels_core::{Diagnostic, PipelineConfig, PipelineCoordinator, Run, TerminationHandler, ToolPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(
    name = "ferpmodels",
    version,
    about = "Solve a QBF, certify the result and, for false formulas, extract a checked strategy"
)]
pub struct Cli {
    /// QBF formula in QDIMACS format
    pub qdimacs_file: PathBuf,

    /// Certificate file (unsat only)
    pub output_file: Option<PathBuf>,

    /// Keep all intermediate files in <dir>
    #[arg(short = 'K', long = "Keep", value_name = "dir")]
    pub keep_all: Option<PathBuf>,

    /// Keep the FERP proof in <dir>
    #[arg(short = 'k', long = "keep", value_name = "dir")]
    pub keep_trace: Option<PathBuf>,

    /// Log all tool output to <dir>
    #[arg(short = 'l', long = "log", value_name = "dir")]
    pub log: Option<PathBuf>,

    #[arg(long = "no-tseitin-optimisation")]
    pub no_tseitin_optimisation: bool,

    /// Print the FERP proof
    #[arg(long)]
    pub print: bool,

    /// YAML file with tool locations
    #[arg(long, value_name = "file")]
    pub tools: Option<PathBuf>,

    /// Base directory for per-run scratch directories
    #[arg(long, value_name = "dir")]
    pub scratch_dir: Option<PathBuf>,

    /// Wall-clock limit for every tool invocation, in seconds
    #[arg(long, value_name = "secs")]
    pub stage_timeout: Option<u64>,

    /// Write a JSON run report to <file>
    #[arg(long, value_name = "file")]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// Builds the run configuration, creating keep/log/output directories.
    pub fn configure(&self) -> Result<(PipelineConfig, Run)> {
        let tools = ToolPaths::resolve(self.tools.as_deref()).context("resolving tool paths")?;
        let mut config = PipelineConfig::new(tools);

        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_base(dir)?;
        }
        if let Some(dir) = &self.keep_all {
            config = config.with_keep_all(dir).context("--Keep directory")?;
        }
        if let Some(dir) = &self.keep_trace {
            config = config.with_keep_trace(dir).context("--keep directory")?;
        }
        if let Some(dir) = &self.log {
            config = config.with_log_dir(dir).context("--log directory")?;
        }
        if let Some(path) = &self.report {
            config = config.with_report(path)?;
        }
        config.tseitin_optimisation = !self.no_tseitin_optimisation;
        config.print_trace = self.print;
        config.stage_timeout = self.stage_timeout.map(Duration::from_secs);

        let run = Run::new(&config, &self.qdimacs_file, self.output_file.as_deref())?;
        Ok((config, run))
    }
}

/// Parses arguments, runs the pipeline and returns the process exit code.
pub async fn run(cli: Cli) -> ExitCode {
    // installed before anything touches the filesystem
    let termination = match TerminationHandler::install() {
        Ok(handler) => handler,
        Err(e) => {
            error!(error = %e, "could not install signal handlers");
            return ExitCode::from(Diagnostic::ConfigError.code());
        }
    };

    let (config, run) = match cli.configure() {
        Ok(configured) => configured,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(Diagnostic::ConfigError.code());
        }
    };

    debug!(
        run_id = %run.run_id,
        scratch = %run.scratch_dir.display(),
        certificate = run.certificate_requested(),
        "run configured"
    );
    let outcome = PipelineCoordinator::new(config, run, termination).execute().await;
    ExitCode::from(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_parse_full_surface() {
        let cli = Cli::try_parse_from([
            "ferpmodels",
            "--Keep",
            "all",
            "-k",
            "trace",
            "--log",
            "logs",
            "--no-tseitin-optimisation",
            "--print",
            "--stage-timeout",
            "60",
            "f.qdimacs",
            "f.aag",
        ])
        .unwrap();
        assert_eq!(cli.keep_all, Some(PathBuf::from("all")));
        assert_eq!(cli.keep_trace, Some(PathBuf::from("trace")));
        assert_eq!(cli.log, Some(PathBuf::from("logs")));
        assert!(cli.no_tseitin_optimisation);
        assert!(cli.print);
        assert_eq!(cli.stage_timeout, Some(60));
        assert_eq!(cli.output_file, Some(PathBuf::from("f.aag")));
    }

    #[test]
    fn test_output_is_optional() {
        let cli = Cli::try_parse_from(["ferpmodels", "f.qdimacs"]).unwrap();
        assert!(cli.output_file.is_none());
        assert!(!cli.print);
    }

    #[test]
    fn test_input_is_required() {
        assert!(Cli::try_parse_from(["ferpmodels"]).is_err());
    }

    #[test]
    fn test_configure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("f.qdimacs");
        std::fs::write(&input, "p cnf 1 1\n").unwrap();
        let keep = dir.path().join("keep");
        let logs = dir.path().join("logs");

        let args: Vec<OsString> = vec![
            "ferpmodels".into(),
            "--Keep".into(),
            keep.clone().into(),
            "--log".into(),
            logs.clone().into(),
            input.into(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let (config, run) = cli.configure().unwrap();
        assert!(keep.is_dir());
        assert!(logs.is_dir());
        assert!(config.tseitin_optimisation);
        assert_eq!(run.keep_all, Some(keep));
    }
}
