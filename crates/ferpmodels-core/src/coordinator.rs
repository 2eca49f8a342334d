//! Pipeline Coordinator: drives the stage table through the state machine.
use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::config::PipelineConfig;
use crate::diagnostic::Diagnostic;
use crate::error::PipelineError;
use crate::log_sink::LogSink;
use crate::machine::{transition, Phase, Step};
use crate::report::{ArtifactRecord, PhaseTimings, RunReport, StageRecord};
use crate::run::Run;
use crate::runner::{StageEnd, StageRunner};
use crate::stage::{StageDescriptor, StageOutcome, Verdict};
use crate::stages::{self, COMPRESSED_SUFFIX};
use crate::termination::TerminationHandler;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub diagnostic: Diagnostic,
    pub verdict: Option<Verdict>,
    pub run_id: String,
    /// Final, compressed certificate path.
    pub certificate: Option<PathBuf>,
    pub report: RunReport,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        self.diagnostic.code()
    }
}

#[derive(Debug, Default)]
struct RunState {
    verdict: Option<Verdict>,
    timings: PhaseTimings,
    records: Vec<StageRecord>,
    generation_start: Option<Instant>,
    certificate_validated: bool,
    certificate: Option<PathBuf>,
}

pub struct PipelineCoordinator {
    config: PipelineConfig,
    run: Run,
    stages: Vec<StageDescriptor>,
    termination: TerminationHandler,
    console: Box<dyn Write + Send>,
}

impl PipelineCoordinator {
    pub fn new(config: PipelineConfig, run: Run, termination: TerminationHandler) -> Self {
        let stages = stages::ferp_pipeline(&config);
        Self {
            config,
            run,
            stages,
            termination,
            console: Box::new(std::io::stdout()),
        }
    }

    /// Redirects progress text, e.g. into a buffer.
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = console;
        self
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Runs to a terminal phase. The scratch directory is removed here and
    /// nowhere else, whatever the outcome.
    pub async fn execute(mut self) -> RunOutcome {
        let started_at = Utc::now();
        let mut store = ArtifactStore::new(&self.run);
        let mut state = RunState::default();

        let (diagnostic, last_phase) = self.drive(&mut store, &mut state).await;

        store.finalize();
        info!(run_id = %self.run.run_id, %diagnostic, code = diagnostic.code(), "run finished");

        let report = self.build_report(started_at, diagnostic, last_phase, &state);
        if let Some(path) = &self.config.report {
            if let Err(e) = report.write_json(path) {
                warn!(error = %e, "failed to write run report");
            }
        }

        RunOutcome {
            diagnostic,
            verdict: state.verdict,
            run_id: self.run.run_id.clone(),
            certificate: state.certificate.clone(),
            report,
        }
    }

    async fn drive(&mut self, store: &mut ArtifactStore, state: &mut RunState) -> (Diagnostic, Phase) {
        let required = stages::required_tools(self.run.certificate_requested());
        if let Err(e) = self.config.tools.check_available(&required) {
            self.say(&format!("{}\n{}\n", Diagnostic::DependencyMissing.describe(None), e));
            return (Diagnostic::DependencyMissing, Phase::Init);
        }

        let log = match LogSink::for_path(self.run.log_file.as_deref()) {
            Ok(log) => log,
            Err(e) => {
                self.say(&format!("{}\n", e));
                return (Diagnostic::ConfigError, Phase::Init);
            }
        };

        if self.termination.is_requested() {
            return (self.interrupted(), Phase::Init);
        }
        if let Err(e) = store.prepare() {
            self.say(&format!("{}\n", e));
            return (Diagnostic::ConfigError, Phase::Init);
        }

        log.record(&format!("run on {}", self.run.input.display()));
        info!(run_id = %self.run.run_id, input = %self.run.input.display(), "run started");

        let termination = self.termination.clone();
        let runner = StageRunner::new(&log, &termination, self.config.stage_timeout);
        let certificate_requested = self.run.certificate_requested();

        let mut phase = Phase::Init;
        let mut step = Step::Passed;
        loop {
            phase = transition(phase, step, state.verdict, certificate_requested);
            match phase {
                Phase::Success => {
                    let diagnostic = self.finish(&runner, store, state, &log).await;
                    return (diagnostic, phase);
                }
                Phase::Failed(diagnostic) => return (diagnostic, phase),
                _ => {}
            }
            if termination.is_requested() {
                return (self.interrupted(), phase);
            }
            step = self.step(phase, &runner, store, state, &log).await;
        }
    }

    async fn step(
        &mut self,
        phase: Phase,
        runner: &StageRunner<'_>,
        store: &ArtifactStore,
        state: &mut RunState,
        log: &LogSink,
    ) -> Step {
        match phase {
            Phase::CheckOutputNonempty => {
                if store.first_line_nonempty(ArtifactKind::ExpandedCnf) {
                    log.blank();
                    log.record("expansion is not empty");
                    Step::Passed
                } else {
                    self.say(&format!("{}\n", Diagnostic::TrivialFormula.describe(None)));
                    Step::Failed(Diagnostic::TrivialFormula)
                }
            }
            Phase::Prove => {
                // an UNSAT answer with an empty proof is still an expansion error
                if store.is_nonempty(ArtifactKind::ResolutionProof) {
                    Step::Passed
                } else {
                    self.say("FAILED\nThe SAT solver did not write a proof\n");
                    Step::Failed(Diagnostic::ExpansionError)
                }
            }
            _ => match self.stages.iter().find(|s| s.phase == phase).cloned() {
                Some(stage) => self.run_stage(&stage, runner, store, state, log).await,
                None => {
                    warn!(phase = phase.name(), "no stage registered for phase");
                    Step::Failed(Diagnostic::ConfigError)
                }
            },
        }
    }

    /// Generic "run stage, interpret result" driver.
    async fn run_stage(
        &mut self,
        stage: &StageDescriptor,
        runner: &StageRunner<'_>,
        store: &ArtifactStore,
        state: &mut RunState,
        log: &LogSink,
    ) -> Step {
        self.say(&format!("{} ... ", stage.progress_label(state.verdict)));
        log.section(stage.log_title);

        if let Some(kind) = stage.consumes.iter().find(|k| !store.is_nonempty(**k)) {
            warn!(stage = stage.id, artifact = kind.label(), "input artifact missing or empty");
            self.say(&format!("FAILED\nThe {} is missing or empty\n", kind.label()));
            return Step::Failed(stage.policy.otherwise);
        }

        if stage.phase == Phase::ExpandCheck {
            state.generation_start = Some(Instant::now());
        }

        let report = match runner.run(stage, &self.run, store).await {
            Ok(report) => report,
            Err(e) => {
                let diagnostic = match e {
                    PipelineError::DependencyMissing { .. } => Diagnostic::DependencyMissing,
                    _ => stage.policy.otherwise,
                };
                self.say(&format!("FAILED\n{}\n", e));
                return Step::Failed(diagnostic);
            }
        };

        // persisted before the status is looked at
        for kind in &stage.produces {
            store.offer(*kind);
        }
        self.record(stage, &report, store, state);

        if let Some(text) = &report.captured {
            log.append_raw(text.trim());
        }

        let status = match report.end {
            StageEnd::Exited(status) => status,
            StageEnd::Interrupted => return Step::Failed(self.interrupted()),
            StageEnd::TimedOut => {
                self.say(&format!("FAILED\n{}\n", Diagnostic::StageTimeout.describe(None)));
                return Step::Failed(Diagnostic::StageTimeout);
            }
        };

        let outcome = stage.interpret(status, report.captured.as_deref(), state.verdict);
        info!(stage = stage.id, ?status, ?outcome, elapsed_ms = report.elapsed.as_millis() as u64, "stage done");

        match outcome {
            StageOutcome::Passed(decided) => {
                if decided.is_some() {
                    state.verdict = decided;
                }
                if let Some(kind) = stage.produces.iter().find(|k| !store.is_produced(**k)) {
                    self.say(&format!("FAILED\nThe {} was not produced\n", kind.label()));
                    return Step::Failed(stage.policy.otherwise);
                }
                self.on_stage_passed(stage, state, log, store);
                Step::Passed
            }
            StageOutcome::Failed(diagnostic) => {
                self.say(&format!("FAILED\n{}\n", diagnostic.describe(status)));
                if let Some(text) = &report.captured {
                    self.say(&format!("{}\n", text.trim()));
                }
                Step::Failed(diagnostic)
            }
        }
    }

    fn on_stage_passed(
        &mut self,
        stage: &StageDescriptor,
        state: &mut RunState,
        log: &LogSink,
        store: &ArtifactStore,
    ) {
        match stage.phase {
            Phase::Solve => {
                let verdict = state.verdict.map(Verdict::truth).unwrap_or("UNKNOWN");
                self.say(&format!("DONE\nThe given formula is {}.\n", verdict));
            }
            Phase::ValidateCert => {
                state.certificate_validated = true;
                self.say("SUCCESS\n");
            }
            _ => self.say("DONE\n"),
        }
        log.blank();
        log.record(stage.log_done);

        if stage.phase == Phase::ValidateTrace {
            self.report_timings(&state.timings, log);
            if self.config.print_trace {
                match std::fs::read_to_string(store.path(ArtifactKind::Trace)) {
                    Ok(trace) => self.say(&format!("{}\n", trace)),
                    Err(e) => warn!(error = %e, "could not read trace for printing"),
                }
            }
        }
    }

    fn record(
        &self,
        stage: &StageDescriptor,
        report: &crate::runner::StageReport,
        store: &ArtifactStore,
        state: &mut RunState,
    ) {
        let secs = PhaseTimings::secs(report.elapsed);
        match stage.phase {
            Phase::Solve => state.timings.solver = Some(secs),
            Phase::MergeTrace => {
                state.timings.to_ferp = Some(secs);
                state.timings.generation = state
                    .generation_start
                    .map(|start| PhaseTimings::secs(start.elapsed()));
            }
            Phase::ValidateTrace => state.timings.ferp_check = Some(secs),
            _ => {}
        }

        let artifacts = stage
            .produces
            .iter()
            .filter_map(|kind| {
                store.digest(*kind).map(|hash| ArtifactRecord { kind: *kind, hash })
            })
            .collect();

        state.records.push(StageRecord {
            id: stage.id.to_string(),
            phase: stage.phase,
            status: report.status(),
            latency_ms: report.elapsed.as_millis() as u64,
            artifacts,
        });
    }

    fn report_timings(&mut self, timings: &PhaseTimings, log: &LogSink) {
        let lines = timings.lines();

        log.section("TIMES");
        for line in &lines {
            log.append_raw(line);
        }
        log.section("TIMES");

        let mut block = String::from("TIMES-------------------------------------\n");
        for line in &lines {
            block.push_str(line);
            block.push('\n');
        }
        block.push_str("------------------------------------------\n");
        self.say(&block);
    }

    /// Success bookkeeping: compress a validated certificate in place.
    async fn finish(
        &mut self,
        runner: &StageRunner<'_>,
        store: &ArtifactStore,
        state: &mut RunState,
        log: &LogSink,
    ) -> Diagnostic {
        if !state.certificate_validated {
            return Diagnostic::Success;
        }

        let stage = stages::compression(&self.config);
        log.section(stage.log_title);
        let report = match runner.run(&stage, &self.run, store).await {
            Ok(report) => report,
            Err(e) => {
                self.say(&format!("{}\n", e));
                return Diagnostic::CompressionFailed;
            }
        };
        self.record(&stage, &report, store, state);

        match report.end {
            StageEnd::Exited(Some(0)) => {
                log.record(stage.log_done);
                state.certificate = self.run.output.as_ref().map(|out| {
                    let mut name = out.clone().into_os_string();
                    name.push(COMPRESSED_SUFFIX);
                    PathBuf::from(name)
                });
                Diagnostic::Success
            }
            StageEnd::Interrupted => self.interrupted(),
            StageEnd::TimedOut => Diagnostic::StageTimeout,
            StageEnd::Exited(status) => {
                self.say(&format!("{}\n", Diagnostic::CompressionFailed.describe(status)));
                Diagnostic::CompressionFailed
            }
        }
    }

    fn interrupted(&mut self) -> Diagnostic {
        let signum = self.termination.signal().unwrap_or(libc::SIGTERM);
        self.say(&format!("\n{} signal handler called. Clean exit.\n", signum));
        Diagnostic::Interrupted
    }

    fn build_report(
        &self,
        started_at: DateTime<Utc>,
        diagnostic: Diagnostic,
        last_phase: Phase,
        state: &RunState,
    ) -> RunReport {
        RunReport {
            run_id: self.run.run_id.clone(),
            input: self.run.input.clone(),
            formula: self.run.formula_name(),
            output: self.run.output.clone(),
            started_at,
            verdict: state.verdict,
            diagnostic,
            exit_code: diagnostic.code(),
            last_phase,
            timings: state.timings.clone(),
            stages: state.records.clone(),
        }
    }

    fn say(&mut self, text: &str) {
        let _ = self.console.write_all(text.as_bytes());
        let _ = self.console.flush();
    }
}
