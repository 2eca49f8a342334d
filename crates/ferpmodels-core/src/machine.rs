//! The coordinator's state machine, kept free of I/O so every transition
//! can be checked on its own.
use crate::diagnostic::Diagnostic;
use crate::stage::Verdict;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Solve,
    CheckOutputNonempty,
    ExpandCheck,
    Prove,
    TraceCheck,
    MergeTrace,
    ValidateTrace,
    ExtractCert,
    EncodeCheck,
    ValidateCert,
    Success,
    Failed(Diagnostic),
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Success | Phase::Failed(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Solve => "SOLVE",
            Phase::CheckOutputNonempty => "CHECK_OUTPUT_NONEMPTY",
            Phase::ExpandCheck => "EXPAND_CHECK",
            Phase::Prove => "PROVE",
            Phase::TraceCheck => "TRACECHECK",
            Phase::MergeTrace => "MERGE_TRACE",
            Phase::ValidateTrace => "VALIDATE_TRACE",
            Phase::ExtractCert => "EXTRACT_CERT",
            Phase::EncodeCheck => "ENCODE_CHECK",
            Phase::ValidateCert => "VALIDATE_CERT",
            Phase::Success => "SUCCESS",
            Phase::Failed(_) => "FAILED",
        }
    }

    pub fn diagnostic(self) -> Option<Diagnostic> {
        match self {
            Phase::Success => Some(Diagnostic::Success),
            Phase::Failed(d) => Some(d),
            _ => None,
        }
    }
}

/// Result of executing one non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Passed,
    Failed(Diagnostic),
}

/// Next phase after `phase` finished with `step`.
pub fn transition(
    phase: Phase,
    step: Step,
    verdict: Option<Verdict>,
    certificate_requested: bool,
) -> Phase {
    if phase.is_terminal() {
        return phase;
    }
    if let Step::Failed(diag) = step {
        return Phase::Failed(diag);
    }

    match phase {
        Phase::Init => Phase::Solve,
        Phase::Solve => Phase::CheckOutputNonempty,
        Phase::CheckOutputNonempty => Phase::ExpandCheck,
        Phase::ExpandCheck => Phase::Prove,
        Phase::Prove => Phase::TraceCheck,
        Phase::TraceCheck => Phase::MergeTrace,
        Phase::MergeTrace => Phase::ValidateTrace,
        Phase::ValidateTrace => {
            if verdict == Some(Verdict::Sat) || !certificate_requested {
                Phase::Success
            } else {
                Phase::ExtractCert
            }
        }
        Phase::ExtractCert => Phase::EncodeCheck,
        Phase::EncodeCheck => Phase::ValidateCert,
        Phase::ValidateCert => Phase::Success,
        Phase::Success | Phase::Failed(_) => phase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(verdict: Verdict, certificate: bool) -> Vec<Phase> {
        let mut phase = Phase::Init;
        let mut visited = vec![phase];
        while !phase.is_terminal() {
            phase = transition(phase, Step::Passed, Some(verdict), certificate);
            visited.push(phase);
        }
        visited
    }

    #[test]
    fn test_unsat_with_certificate_visits_every_phase() {
        let visited = walk(Verdict::Unsat, true);
        assert_eq!(
            visited,
            vec![
                Phase::Init,
                Phase::Solve,
                Phase::CheckOutputNonempty,
                Phase::ExpandCheck,
                Phase::Prove,
                Phase::TraceCheck,
                Phase::MergeTrace,
                Phase::ValidateTrace,
                Phase::ExtractCert,
                Phase::EncodeCheck,
                Phase::ValidateCert,
                Phase::Success,
            ]
        );
    }

    #[test]
    fn test_sat_never_extracts() {
        let visited = walk(Verdict::Sat, true);
        assert!(!visited.contains(&Phase::ExtractCert));
        assert_eq!(visited.last(), Some(&Phase::Success));
    }

    #[test]
    fn test_no_output_stops_after_trace_validation() {
        let visited = walk(Verdict::Unsat, false);
        assert_eq!(&visited[visited.len() - 2..], &[Phase::ValidateTrace, Phase::Success]);
    }

    #[test]
    fn test_failure_is_terminal() {
        let failed = transition(
            Phase::CheckOutputNonempty,
            Step::Failed(Diagnostic::TrivialFormula),
            Some(Verdict::Unsat),
            true,
        );
        assert_eq!(failed, Phase::Failed(Diagnostic::TrivialFormula));
        assert_eq!(transition(failed, Step::Passed, None, true), failed);
        assert_eq!(failed.diagnostic(), Some(Diagnostic::TrivialFormula));
    }

    #[test]
    fn test_validate_cert_outcomes() {
        assert_eq!(
            transition(Phase::ValidateCert, Step::Failed(Diagnostic::CertificateSatisfiable), None, true),
            Phase::Failed(Diagnostic::CertificateSatisfiable)
        );
        assert_eq!(transition(Phase::ValidateCert, Step::Passed, None, true), Phase::Success);
    }
}
