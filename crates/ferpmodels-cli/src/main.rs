//! Binary entrypoint for the ferpmodels pipeline.
use clap::Parser;
use ferpmodels_cli::{run, Cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout carries progress, diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(ferpmodels_core::Diagnostic::ConfigError.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    run(cli).await
}
