//! Normalized rates derived from raw session counters.
//!
//! Every rate is in `[0, 1]` and is `0.0` when its denominator is zero.

use crate::store::SessionCounters;

/// `errors / tool_calls`.
pub fn error_rate(session: &SessionCounters) -> f64 {
    ratio(session.errors, session.tool_calls)
}

/// `reworks / file_edits`.
pub fn rework_rate(session: &SessionCounters) -> f64 {
    ratio(session.reworks, session.file_edits)
}

/// `tests_passed / test_runs`.
pub fn test_pass_rate(session: &SessionCounters) -> f64 {
    ratio(session.tests_passed, session.test_runs)
}

/// Guarded division, capped at 1.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64).min(1.0)
}
