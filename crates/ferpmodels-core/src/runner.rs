//! Stage Runner: spawns one tool, waits for it, measures it.
use crate::artifact::ArtifactStore;
use crate::error::PipelineError;
use crate::log_sink::LogSink;
use crate::run::Run;
use crate::stage::{StageDescriptor, StdoutTarget};
use crate::termination::TerminationHandler;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Time a terminated process group gets before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEnd {
    /// Exit status, `None` if the tool died from a signal.
    Exited(Option<i32>),
    TimedOut,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub end: StageEnd,
    pub elapsed: Duration,
    /// Standard output for `StdoutTarget::Capture` stages.
    pub captured: Option<String>,
}

impl StageReport {
    pub fn status(&self) -> Option<i32> {
        match self.end {
            StageEnd::Exited(status) => status,
            _ => None,
        }
    }
}

pub struct StageRunner<'a> {
    log: &'a LogSink,
    termination: &'a TerminationHandler,
    timeout: Option<Duration>,
}

impl<'a> StageRunner<'a> {
    pub fn new(log: &'a LogSink, termination: &'a TerminationHandler, timeout: Option<Duration>) -> Self {
        Self {
            log,
            termination,
            timeout,
        }
    }

    pub async fn run(
        &self,
        stage: &StageDescriptor,
        run: &Run,
        store: &ArtifactStore,
    ) -> Result<StageReport, PipelineError> {
        let args = stage.resolve_args(run, store)?;

        // own process group, so a termination reaches the whole tool tree
        let mut group = std::process::Command::new(&stage.program);
        group.process_group(0);
        let mut cmd = Command::from(group);
        cmd.args(&args).stdin(Stdio::null()).kill_on_drop(true);

        match stage.stdout {
            StdoutTarget::Log => {
                cmd.stdout(self.log.stdio());
            }
            StdoutTarget::Capture => {
                cmd.stdout(Stdio::piped());
            }
            StdoutTarget::Artifact(kind) => {
                let path = store.path(kind);
                let file = std::fs::File::create(&path)
                    .map_err(|e| PipelineError::io(format!("creating {}", path.display()), e))?;
                cmd.stdout(Stdio::from(file));
            }
            StdoutTarget::Discard => {
                cmd.stdout(Stdio::null());
            }
        }
        if stage.quiet {
            cmd.stderr(Stdio::null());
        }

        debug!(stage = stage.id, program = %stage.program.display(), ?args, "spawning stage");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                PipelineError::DependencyMissing {
                    tool: stage.tool.name(),
                    path: stage.program.clone(),
                }
            }
            _ => PipelineError::io(format!("spawning {}", stage.program.display()), e),
        })?;

        let capture = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).await.map(|_| buf)
            })
        });

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let end = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| PipelineError::io(format!("waiting for {}", stage.id), e))?;
                StageEnd::Exited(status.code())
            }
            _ = self.termination.requested() => {
                terminate_group(&mut child, stage.id).await;
                StageEnd::Interrupted
            }
            _ = deadline => {
                warn!(stage = stage.id, "stage deadline expired");
                terminate_group(&mut child, stage.id).await;
                StageEnd::TimedOut
            }
        };
        let elapsed = start.elapsed();

        let captured = match capture {
            Some(task) => match task.await {
                Ok(Ok(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                Ok(Err(e)) => {
                    warn!(stage = stage.id, error = %e, "failed to read stage output");
                    Some(String::new())
                }
                Err(e) => {
                    warn!(stage = stage.id, error = %e, "output reader failed");
                    Some(String::new())
                }
            },
            None => None,
        };

        debug!(stage = stage.id, ?end, elapsed_ms = elapsed.as_millis() as u64, "stage finished");
        Ok(StageReport {
            end,
            elapsed,
            captured,
        })
    }
}

/// SIGTERM to the child's process group, SIGKILL after a grace period.
async fn terminate_group(child: &mut Child, stage: &str) {
    let Some(pid) = child.id() else {
        return;
    };
    let pgid = pid as libc::pid_t;
    // SAFETY: killpg only sends a signal; the group was created for this child.
    unsafe {
        libc::killpg(pgid, libc::SIGTERM);
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        warn!(stage, pid, "stage ignored SIGTERM, killing");
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
        let _ = child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::config::{PipelineConfig, Tool, ToolPaths};
    use crate::diagnostic::Diagnostic;
    use crate::machine::Phase;
    use crate::stage::{Arg, ExitPolicy, OutputCheck};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn setup(dir: &Path) -> (Run, ArtifactStore) {
        let input = dir.join("f.qdimacs");
        std::fs::write(&input, "p cnf 1 1\n").unwrap();
        let config = PipelineConfig::new(ToolPaths::from_pairs([]))
            .with_scratch_base(&dir.join("scratch"))
            .unwrap();
        let run = Run::new(&config, &input, None).unwrap();
        let store = ArtifactStore::new(&run);
        store.prepare().unwrap();
        (run, store)
    }

    fn stage(program: PathBuf, stdout: StdoutTarget, args: Vec<Arg>) -> StageDescriptor {
        StageDescriptor {
            phase: Phase::MergeTrace,
            id: "test.stage",
            label: "Testing",
            log_title: "testing",
            log_done: "test OK",
            tool: Tool::ToFerp,
            program,
            args,
            stdout,
            quiet: false,
            consumes: Vec::new(),
            produces: Vec::new(),
            policy: ExitPolicy::zero(Diagnostic::TraceMergeFailed),
            check: OutputCheck::None,
        }
    }

    #[tokio::test]
    async fn test_exit_status_and_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        let tool = script(dir.path(), "tool", "echo \"got $1\"\nexit 20");
        let log = LogSink::null();
        let termination = TerminationHandler::detached();
        let runner = StageRunner::new(&log, &termination, None);

        let report = runner
            .run(&stage(tool, StdoutTarget::Capture, vec![Arg::Input]), &run, &store)
            .await
            .unwrap();
        assert_eq!(report.end, StageEnd::Exited(Some(20)));
        assert_eq!(report.captured.unwrap().trim(), format!("got {}", run.input.display()));
    }

    #[tokio::test]
    async fn test_stdout_into_artifact_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        let tool = script(dir.path(), "tool", "echo 'p cnf 1 1'");
        let log_path = dir.path().join("run.log");
        let log = LogSink::open(&log_path).unwrap();
        let termination = TerminationHandler::detached();
        let runner = StageRunner::new(&log, &termination, None);

        runner
            .run(&stage(tool.clone(), StdoutTarget::Artifact(ArtifactKind::MergedCnf), Vec::new()), &run, &store)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path(ArtifactKind::MergedCnf)).unwrap(),
            "p cnf 1 1\n"
        );

        runner.run(&stage(tool, StdoutTarget::Log, Vec::new()), &run, &store).await.unwrap();
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "p cnf 1 1\n");
    }

    #[tokio::test]
    async fn test_stage_leads_its_own_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        // field 5 of /proc/<pid>/stat is the process group id
        let tool = script(dir.path(), "tool", "echo \"$$ $(cut -d' ' -f5 /proc/$$/stat)\"");
        let log = LogSink::null();
        let termination = TerminationHandler::detached();
        let runner = StageRunner::new(&log, &termination, None);

        let report = runner
            .run(&stage(tool, StdoutTarget::Capture, Vec::new()), &run, &store)
            .await
            .unwrap();
        let captured = report.captured.unwrap();
        let ids: Vec<&str> = captured.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "{}", captured);
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[1], std::process::id().to_string());
    }

    #[tokio::test]
    async fn test_missing_program_is_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        let log = LogSink::null();
        let termination = TerminationHandler::detached();
        let runner = StageRunner::new(&log, &termination, None);

        let err = runner
            .run(&stage(dir.path().join("absent"), StdoutTarget::Log, Vec::new()), &run, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DependencyMissing { .. }));
    }

    #[tokio::test]
    async fn test_deadline_terminates_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        let tool = script(dir.path(), "slow", "sleep 30");
        let log = LogSink::null();
        let termination = TerminationHandler::detached();
        let runner = StageRunner::new(&log, &termination, Some(Duration::from_millis(200)));

        let report = runner.run(&stage(tool, StdoutTarget::Log, Vec::new()), &run, &store).await.unwrap();
        assert_eq!(report.end, StageEnd::TimedOut);
        assert!(report.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_termination_interrupts_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (run, store) = setup(dir.path());
        let tool = script(dir.path(), "slow", "sleep 30");
        let log = LogSink::null();
        let termination = TerminationHandler::detached();
        let trigger = termination.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        });
        let runner = StageRunner::new(&log, &termination, None);

        let report = runner.run(&stage(tool, StdoutTarget::Log, Vec::new()), &run, &store).await.unwrap();
        assert_eq!(report.end, StageEnd::Interrupted);
        assert_eq!(report.status(), None);
    }
}
