//! Terminal outcomes of a run and their stable process exit codes.
use serde::{Deserialize, Serialize};

/// Every way a run can end. Each variant owns exactly one exit code; the
/// integers are part of the external contract and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    Success,
    /// Bad arguments, missing input, unwritable directories.
    ConfigError,
    /// QBF solver exited with neither the SAT nor the UNSAT status.
    SolverStatus,
    /// QBF solver produced an empty expansion.
    TrivialFormula,
    /// Re-solving the expansion said SAT.
    ExpansionSatisfiable,
    ExpansionError,
    ProofRejected,
    TraceMergeFailed,
    TraceInvalid,
    ExtractionFailed,
    CertificateMergeFailed,
    /// The merged formula is SAT, so the extracted strategy is wrong.
    CertificateSatisfiable,
    CertificateCheckError,
    CompressionFailed,
    StageTimeout,
    DependencyMissing,
    Interrupted,
}

impl Diagnostic {
    pub const ALL: [Diagnostic; 17] = [
        Diagnostic::Success,
        Diagnostic::ConfigError,
        Diagnostic::SolverStatus,
        Diagnostic::TrivialFormula,
        Diagnostic::ExpansionSatisfiable,
        Diagnostic::ExpansionError,
        Diagnostic::ProofRejected,
        Diagnostic::TraceMergeFailed,
        Diagnostic::TraceInvalid,
        Diagnostic::ExtractionFailed,
        Diagnostic::CertificateMergeFailed,
        Diagnostic::CertificateSatisfiable,
        Diagnostic::CertificateCheckError,
        Diagnostic::CompressionFailed,
        Diagnostic::StageTimeout,
        Diagnostic::DependencyMissing,
        Diagnostic::Interrupted,
    ];

    pub fn code(self) -> u8 {
        match self {
            Diagnostic::Success => 0,
            Diagnostic::ConfigError => 1,
            Diagnostic::SolverStatus => 2,
            Diagnostic::TrivialFormula => 100,
            Diagnostic::ExpansionSatisfiable => 3,
            Diagnostic::ExpansionError => 4,
            Diagnostic::ProofRejected => 5,
            Diagnostic::TraceMergeFailed => 6,
            Diagnostic::TraceInvalid => 7,
            Diagnostic::ExtractionFailed => 8,
            Diagnostic::CertificateMergeFailed => 9,
            Diagnostic::CertificateSatisfiable => 10,
            Diagnostic::CertificateCheckError => 11,
            Diagnostic::CompressionFailed => 12,
            Diagnostic::StageTimeout => 124,
            Diagnostic::DependencyMissing => 127,
            Diagnostic::Interrupted => 130,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == Diagnostic::Success
    }

    /// True for failures where a tool ran fine but its answer contradicts
    /// the rest of the run.
    pub fn is_semantic_inconsistency(self) -> bool {
        matches!(
            self,
            Diagnostic::ExpansionSatisfiable | Diagnostic::CertificateSatisfiable
        )
    }

    /// Console line printed after `FAILED`. `status` is the offending tool
    /// exit status when there is one.
    pub fn describe(self, status: Option<i32>) -> String {
        let status = status.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string());
        match self {
            Diagnostic::Success => "SUCCESS".to_string(),
            Diagnostic::ConfigError => "Invalid configuration".to_string(),
            Diagnostic::TrivialFormula => "Output of the QBF solver is empty, make sure that the given \
                 qbf is not trivially true or false, e.g. it contains only existential variables."
                .to_string(),
            Diagnostic::ExpansionSatisfiable => "The expanded formula is SAT".to_string(),
            Diagnostic::CertificateSatisfiable => "The merged formula is SAT".to_string(),
            Diagnostic::ProofRejected => "The resolution proof was rejected".to_string(),
            Diagnostic::StageTimeout => "The stage exceeded its deadline".to_string(),
            Diagnostic::DependencyMissing => "One or more dependencies are missing".to_string(),
            Diagnostic::Interrupted => "Interrupted by signal".to_string(),
            Diagnostic::SolverStatus
            | Diagnostic::ExpansionError
            | Diagnostic::TraceMergeFailed
            | Diagnostic::TraceInvalid
            | Diagnostic::ExtractionFailed
            | Diagnostic::CertificateMergeFailed
            | Diagnostic::CertificateCheckError
            | Diagnostic::CompressionFailed => {
                format!("There has been an error with code {}", status)
            }
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Diagnostic::Success => "success",
            Diagnostic::ConfigError => "config-error",
            Diagnostic::SolverStatus => "solver-unexpected-status",
            Diagnostic::TrivialFormula => "trivial-formula",
            Diagnostic::ExpansionSatisfiable => "expansion-satisfiable",
            Diagnostic::ExpansionError => "expansion-error",
            Diagnostic::ProofRejected => "proof-rejected",
            Diagnostic::TraceMergeFailed => "trace-merge-failed",
            Diagnostic::TraceInvalid => "trace-invalid",
            Diagnostic::ExtractionFailed => "extraction-failed",
            Diagnostic::CertificateMergeFailed => "certificate-merge-failed",
            Diagnostic::CertificateSatisfiable => "certificate-satisfiable",
            Diagnostic::CertificateCheckError => "certificate-check-error",
            Diagnostic::CompressionFailed => "compression-failed",
            Diagnostic::StageTimeout => "stage-timeout",
            Diagnostic::DependencyMissing => "dependency-missing",
            Diagnostic::Interrupted => "interrupted",
        };
        write!(f, "{}", name)
    }
}
