//! The FERP toolchain as a stage table.
//!
//! # Pipeline Flow
//!
//! ```text
//! qdimacs → ijtihad → picosat → tracecheck → toferp → ferpcheck
//!              ↓          ↓          ↓          ↓
//!           tmp.cnf   tmp.proof  tmp.proof2  tmp.ferp
//!
//! (unsat + output) → ferpcert → certcheck → picosat → gzip
//!                       ↓           ↓
//!                    <output>   tmp.cnf2
//! ```

pub mod tracecheck;

use crate::artifact::ArtifactKind;
use crate::config::{PipelineConfig, Tool};
use crate::diagnostic::Diagnostic;
use crate::machine::Phase;
use crate::stage::{Arg, ExitPolicy, OutputCheck, StageDescriptor, StdoutTarget, Verdict};

/// Conventional SAT-solver exit statuses.
pub const STATUS_SAT: i32 = 10;
pub const STATUS_UNSAT: i32 = 20;

/// Tool-running stages in execution order.
pub fn ferp_pipeline(config: &PipelineConfig) -> Vec<StageDescriptor> {
    let tools = &config.tools;

    let mut solve_args = Vec::new();
    if !config.tseitin_optimisation {
        solve_args.push(Arg::lit("--tseitin_optimisation=0"));
    }
    solve_args.extend([
        Arg::lit("--wit_per_call=-1"),
        Arg::lit("--cex_per_call=-1"),
        Arg::prefixed("--tmp_dir=", Arg::ScratchDir),
        Arg::prefixed("--log_phi=", Arg::Artifact(ArtifactKind::ExpandedCnf)),
        // the SAT branch logs through ksi
        Arg::prefixed("--log_ksi=", Arg::Artifact(ArtifactKind::ExpandedCnf)),
        Arg::Input,
    ]);

    vec![
        StageDescriptor {
            phase: Phase::Solve,
            id: "solve.ijtihad",
            label: "Calling QBF solver",
            log_title: "running QBF solver",
            log_done: "QBF solver OK",
            tool: Tool::QbfSolver,
            program: tools.get(Tool::QbfSolver).to_path_buf(),
            args: solve_args,
            stdout: StdoutTarget::Log,
            quiet: false,
            consumes: Vec::new(),
            produces: vec![ArtifactKind::ExpandedCnf],
            policy: ExitPolicy {
                accept: vec![
                    (STATUS_SAT, Some(Verdict::Sat)),
                    (STATUS_UNSAT, Some(Verdict::Unsat)),
                ],
                reject: Vec::new(),
                otherwise: Diagnostic::SolverStatus,
            },
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::ExpandCheck,
            id: "expand.picosat",
            label: "Calling SAT solver",
            log_title: "running SAT solver",
            log_done: "SAT solver OK",
            tool: Tool::SatSolver,
            program: tools.get(Tool::SatSolver).to_path_buf(),
            args: vec![
                Arg::lit("-v"),
                Arg::lit("-T"),
                Arg::Artifact(ArtifactKind::ResolutionProof),
                Arg::Artifact(ArtifactKind::ExpandedCnf),
            ],
            stdout: StdoutTarget::Log,
            quiet: false,
            consumes: vec![ArtifactKind::ExpandedCnf],
            produces: vec![ArtifactKind::ResolutionProof],
            policy: ExitPolicy {
                accept: vec![(STATUS_UNSAT, None)],
                reject: vec![(STATUS_SAT, Diagnostic::ExpansionSatisfiable)],
                otherwise: Diagnostic::ExpansionError,
            },
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::TraceCheck,
            id: "trace.tracecheck",
            label: "Checking {branch} proof",
            log_title: "running tracecheck",
            log_done: "tracecheck OK",
            tool: Tool::Tracecheck,
            program: tools.get(Tool::Tracecheck).to_path_buf(),
            args: vec![
                Arg::lit("-v"),
                Arg::lit("-B"),
                Arg::Artifact(ArtifactKind::BinaryProof),
                Arg::lit("-c"),
                Arg::Artifact(ArtifactKind::ExpandedCnf),
                Arg::Artifact(ArtifactKind::ResolutionProof),
            ],
            stdout: StdoutTarget::Capture,
            quiet: false,
            consumes: vec![ArtifactKind::ExpandedCnf, ArtifactKind::ResolutionProof],
            produces: vec![ArtifactKind::BinaryProof],
            policy: ExitPolicy::zero(Diagnostic::ProofRejected),
            check: OutputCheck::ResolutionSummary,
        },
        StageDescriptor {
            phase: Phase::MergeTrace,
            id: "merge.toferp",
            label: "Producing FERP trace",
            log_title: "producing FERP trace",
            log_done: "FERP trace OK",
            tool: Tool::ToFerp,
            program: tools.get(Tool::ToFerp).to_path_buf(),
            args: vec![
                Arg::Artifact(ArtifactKind::ExpandedCnf),
                Arg::Artifact(ArtifactKind::BinaryProof),
                Arg::Artifact(ArtifactKind::Trace),
            ],
            stdout: StdoutTarget::Log,
            quiet: false,
            consumes: vec![ArtifactKind::ExpandedCnf, ArtifactKind::BinaryProof],
            produces: vec![ArtifactKind::Trace],
            policy: ExitPolicy::zero(Diagnostic::TraceMergeFailed),
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::ValidateTrace,
            id: "validate.ferpcheck",
            label: "Checking FERP trace",
            log_title: "checking FERP trace",
            log_done: "FERP trace valid",
            tool: Tool::FerpCheck,
            program: tools.get(Tool::FerpCheck).to_path_buf(),
            args: vec![Arg::Input, Arg::Artifact(ArtifactKind::Trace)],
            stdout: StdoutTarget::Log,
            quiet: false,
            consumes: vec![ArtifactKind::Trace],
            produces: Vec::new(),
            policy: ExitPolicy::zero(Diagnostic::TraceInvalid),
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::ExtractCert,
            id: "extract.ferpcert",
            label: "Extracting strategy",
            log_title: "extracting strategy",
            log_done: "strategy extracted",
            tool: Tool::FerpCert,
            program: tools.get(Tool::FerpCert).to_path_buf(),
            args: vec![
                Arg::Input,
                Arg::Artifact(ArtifactKind::Trace),
                Arg::Artifact(ArtifactKind::Certificate),
            ],
            stdout: StdoutTarget::Log,
            quiet: false,
            consumes: vec![ArtifactKind::Trace],
            produces: vec![ArtifactKind::Certificate],
            policy: ExitPolicy::zero(Diagnostic::ExtractionFailed),
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::EncodeCheck,
            id: "encode.certcheck",
            label: "Producing CNF",
            log_title: "merging certificate and formula",
            log_done: "merged CNF OK",
            tool: Tool::CertCheck,
            program: tools.get(Tool::CertCheck).to_path_buf(),
            args: vec![Arg::Input, Arg::Artifact(ArtifactKind::Certificate)],
            stdout: StdoutTarget::Artifact(ArtifactKind::MergedCnf),
            quiet: false,
            consumes: vec![ArtifactKind::Certificate],
            produces: vec![ArtifactKind::MergedCnf],
            policy: ExitPolicy::zero(Diagnostic::CertificateMergeFailed),
            check: OutputCheck::None,
        },
        StageDescriptor {
            phase: Phase::ValidateCert,
            id: "validate.picosat",
            label: "Check validity of certificate",
            log_title: "checking certificate",
            log_done: "certificate valid",
            tool: Tool::SatSolver,
            program: tools.get(Tool::SatSolver).to_path_buf(),
            args: vec![Arg::Artifact(ArtifactKind::MergedCnf)],
            stdout: StdoutTarget::Discard,
            quiet: true,
            consumes: vec![ArtifactKind::MergedCnf],
            produces: Vec::new(),
            policy: ExitPolicy {
                accept: vec![(STATUS_UNSAT, None)],
                reject: vec![(STATUS_SAT, Diagnostic::CertificateSatisfiable)],
                otherwise: Diagnostic::CertificateCheckError,
            },
            check: OutputCheck::None,
        },
    ]
}

/// In-place compression of the certificate once it has been validated.
pub fn compression(config: &PipelineConfig) -> StageDescriptor {
    StageDescriptor {
        phase: Phase::Success,
        id: "persist.gzip",
        label: "Compressing certificate",
        log_title: "compressing certificate",
        log_done: "certificate compressed",
        tool: Tool::Compressor,
        program: config.tools.get(Tool::Compressor).to_path_buf(),
        args: vec![Arg::lit("-f"), Arg::Output],
        stdout: StdoutTarget::Log,
        quiet: false,
        consumes: Vec::new(),
        produces: Vec::new(),
        policy: ExitPolicy::zero(Diagnostic::CompressionFailed),
        check: OutputCheck::None,
    }
}

/// Tools a run needs. The certificate tools are only required when an
/// output path was given.
pub fn required_tools(certificate_requested: bool) -> Vec<Tool> {
    let mut tools = vec![
        Tool::QbfSolver,
        Tool::SatSolver,
        Tool::Tracecheck,
        Tool::ToFerp,
        Tool::FerpCheck,
    ];
    if certificate_requested {
        tools.extend([Tool::FerpCert, Tool::CertCheck, Tool::Compressor]);
    }
    tools
}

/// Suffix the compressor appends to the certificate.
pub const COMPRESSED_SUFFIX: &str = ".gz";
