//! Coordinator runs against scripted tools, observed through the outcome
//! and the console text.

use ferpmodels_core::{
    Diagnostic, Phase, PipelineConfig, PipelineCoordinator, Run, TerminationHandler, Tool, ToolPaths, Verdict,
};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Console(Arc<Mutex<Vec<u8>>>);

impl Console {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn toolchain(dir: &Path) -> ToolPaths {
    let qbf = script(
        dir,
        "qbf",
        r#"for a in "$@"; do case "$a" in --log_phi=*) cnf="${a#--log_phi=}" ;; esac; done
printf 'p cnf 1 2\n1 0\n-1 0\n' > "$cnf"
exit 20"#,
    );
    let sat = script(dir, "sat", r#"[ "$1" = "-v" ] && printf '1 1 0 0\n' > "$3"
exit 20"#);
    let tracecheck = script(dir, "tracecheck", r#"printf '1 1 0 0\n' > "$3"
echo "resolved 1 root and 1 empty clause""#);
    let toferp = script(dir, "toferp", r#"printf 'trace\n' > "$3""#);
    let ferpcheck = script(dir, "ferpcheck", "exit 0");
    let ferpcert = script(dir, "ferpcert", r#"printf 'aag\n' > "$3""#);
    let certcheck = script(dir, "certcheck", "echo 'p cnf 1 2'");
    let gzip = script(dir, "gzip", r#"mv "$2" "$2.gz""#);

    ToolPaths::from_pairs([
        (Tool::QbfSolver, qbf),
        (Tool::SatSolver, sat),
        (Tool::Tracecheck, tracecheck),
        (Tool::ToFerp, toferp),
        (Tool::FerpCheck, ferpcheck),
        (Tool::FerpCert, ferpcert),
        (Tool::CertCheck, certcheck),
        (Tool::Compressor, gzip),
    ])
}

fn coordinator(
    dir: &Path,
    tools: ToolPaths,
    output: Option<&Path>,
    termination: TerminationHandler,
) -> (PipelineCoordinator, Console) {
    let input = dir.join("f.qdimacs");
    std::fs::write(&input, "p cnf 1 1\ne 1 0\n1 0\n").unwrap();
    let config = PipelineConfig::new(tools)
        .with_scratch_base(&dir.join("scratch"))
        .unwrap();
    let run = Run::new(&config, &input, output).unwrap();
    let console = Console::default();
    let coordinator =
        PipelineCoordinator::new(config, run, termination).with_console(Box::new(console.clone()));
    (coordinator, console)
}

#[tokio::test]
async fn test_certificate_run_reports_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let tools = toolchain(dir.path());
    let output = dir.path().join("f.aag");
    let (coordinator, console) =
        coordinator(dir.path(), tools, Some(&output), TerminationHandler::detached());
    let scratch = coordinator.run().scratch_dir.clone();

    let outcome = coordinator.execute().await;

    assert_eq!(outcome.diagnostic, Diagnostic::Success);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.verdict, Some(Verdict::Unsat));
    assert_eq!(outcome.certificate, Some(dir.path().join("f.aag.gz")));
    assert!(!scratch.exists());

    let ids: Vec<&str> = outcome.report.stages.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "solve.ijtihad",
            "expand.picosat",
            "trace.tracecheck",
            "merge.toferp",
            "validate.ferpcheck",
            "extract.ferpcert",
            "encode.certcheck",
            "validate.picosat",
            "persist.gzip",
        ]
    );
    assert!(outcome.report.stages[0].artifacts[0].hash.starts_with("blake3:"));
    assert!(outcome.report.timings.solver.is_some());
    assert!(outcome.report.timings.ferp_check.is_some());
    assert_eq!(outcome.report.last_phase, Phase::Success);

    let text = console.text();
    assert!(text.contains("Calling QBF solver ... DONE\nThe given formula is FALSE.\n"));
    assert!(text.contains("TIMES-----"));
}

#[tokio::test]
async fn test_failure_names_last_phase() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = toolchain(dir.path());
    tools.set(Tool::FerpCheck, script(dir.path(), "bad-ferpcheck", "exit 1"));
    let (coordinator, console) = coordinator(dir.path(), tools, None, TerminationHandler::detached());
    let scratch = coordinator.run().scratch_dir.clone();

    let outcome = coordinator.execute().await;

    assert_eq!(outcome.diagnostic, Diagnostic::TraceInvalid);
    assert_eq!(outcome.report.last_phase, Phase::Failed(Diagnostic::TraceInvalid));
    assert!(outcome.report.timings.generation.is_some());
    assert!(console.text().contains("Checking FERP trace ... FAILED\n"));
    assert!(!scratch.exists());
}

#[tokio::test]
async fn test_termination_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let tools = toolchain(dir.path());
    let termination = TerminationHandler::detached();
    termination.trigger();
    let (coordinator, console) = coordinator(dir.path(), tools, None, termination);

    let outcome = coordinator.execute().await;

    assert_eq!(outcome.diagnostic, Diagnostic::Interrupted);
    assert_eq!(outcome.exit_code(), 130);
    assert!(outcome.report.stages.is_empty());
    assert!(console.text().contains("signal handler called. Clean exit."));
}

#[tokio::test]
async fn test_termination_mid_stage_stops_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = toolchain(dir.path());
    let started = dir.path().join("toferp.started");
    tools.set(
        Tool::ToFerp,
        script(
            dir.path(),
            "slow-toferp",
            &format!("touch '{}'\nexec sleep 30", started.display()),
        ),
    );
    let termination = TerminationHandler::detached();
    let trigger = termination.clone();
    let (coordinator, _console) = coordinator(dir.path(), tools, None, termination);
    let scratch = coordinator.run().scratch_dir.clone();

    tokio::spawn(async move {
        while !started.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        trigger.trigger();
    });
    let outcome = coordinator.execute().await;

    assert_eq!(outcome.diagnostic, Diagnostic::Interrupted);
    let last = outcome.report.stages.last().unwrap();
    assert_eq!(last.id, "merge.toferp");
    assert_eq!(last.status, None);
    assert!(!scratch.exists());
}
