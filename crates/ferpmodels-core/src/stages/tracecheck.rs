//! tracecheck summary parsing.
//!
//! tracecheck reports its verdict only as free text, so this is the one
//! place that reads it. Everything else sees a boolean.

use crate::stage::Verdict;

pub const ONE_ROOT: &str = "resolved 1 root and 1 empty clause";
pub const ZERO_ROOTS: &str = "resolved 0 roots and 1 empty clause";

/// True when some output line is exactly the accepted summary. Zero roots
/// is only acceptable on the satisfiable branch.
pub fn summary_accepts(output: &str, verdict: Option<Verdict>) -> bool {
    let is_sat = verdict == Some(Verdict::Sat);
    output
        .trim()
        .lines()
        .any(|line| line == ONE_ROOT || (is_sat && line == ZERO_ROOTS))
}
