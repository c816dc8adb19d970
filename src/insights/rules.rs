//! Pattern rules.
//!
//! A rule is a stateless check over the current session counters and the
//! historical baselines. Rules are evaluated independently; a rule that
//! returns an error is skipped by the generator without affecting the rest.

use super::anomaly::z_score;
use super::confidence::default_context_match;
use super::rates::{error_rate, rework_rate, test_pass_rate};
use super::types::{HistoricalStats, TipCategory};
use crate::error::{RuleError, RuleResult};
use crate::store::SessionCounters;

/// Z-score above which a rate counts as anomalous.
pub const ANOMALY_Z: f64 = 2.0;

/// A declarative trigger for one kind of tip.
pub trait PatternRule: Send + Sync {
    /// Stable identifier, used for accuracy tracking.
    fn name(&self) -> &'static str;

    /// Category whose command registry supplies the recommendation.
    fn category(&self) -> TipCategory;

    /// Command to recommend if the category has no candidates.
    fn fallback_command(&self) -> &'static str;

    /// Whether the rule fires for this session.
    fn evaluate(&self, session: &SessionCounters, historical: &HistoricalStats)
        -> RuleResult<bool>;

    /// Human-readable message for a fired rule.
    fn build_message(
        &self,
        session: &SessionCounters,
        historical: &HistoricalStats,
    ) -> RuleResult<String>;

    /// Short statement of the data behind the tip.
    fn evidence(&self, session: &SessionCounters, historical: &HistoricalStats) -> String;

    /// Anomaly magnitude feeding the statistical confidence factor.
    fn z_score(&self, _session: &SessionCounters, _historical: &HistoricalStats) -> f64 {
        0.0
    }

    /// How well the current session supports the rule.
    fn context_match(&self, session: &SessionCounters) -> f64 {
        default_context_match(session)
    }

    /// Discount for rules whose inputs are estimates.
    fn confidence_penalty(&self) -> f64 {
        0.0
    }
}

/// The built-in rules, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(HighErrorRate),
        Box::new(HighReworkRate),
        Box::new(FailingTests),
        Box::new(UntestedEdits),
        Box::new(FileChurn),
        Box::new(ContextPressure),
        Box::new(LongSession),
    ]
}

fn percent(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

fn ensure_within(name: &'static str, part: u64, total: u64) -> RuleResult<()> {
    if part > total {
        return Err(RuleError::InvalidCounter {
            name: name.to_string(),
            value: part as f64,
        });
    }
    Ok(())
}

// ============================================================================
// Statistical Rules
// ============================================================================

/// Error rate well above the historical norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighErrorRate;

impl PatternRule for HighErrorRate {
    fn name(&self) -> &'static str {
        "high_error_rate"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Safety
    }

    fn fallback_command(&self) -> &'static str {
        "/undo:checkpoint"
    }

    fn evaluate(&self, session: &SessionCounters, historical: &HistoricalStats) -> RuleResult<bool> {
        if session.tool_calls == 0 {
            return Ok(false);
        }
        ensure_within("errors", session.errors, session.tool_calls)?;
        Ok(self.z_score(session, historical) > ANOMALY_Z)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "Error rate is {} ({} of {} tool calls), well above your usual {}. Secure your work before going further.",
            percent(error_rate(session)),
            session.errors,
            session.tool_calls,
            percent(historical.avg_error_rate)
        ))
    }

    fn evidence(&self, session: &SessionCounters, historical: &HistoricalStats) -> String {
        format!(
            "error rate {} vs baseline {} (z={:.1})",
            percent(error_rate(session)),
            percent(historical.avg_error_rate),
            self.z_score(session, historical)
        )
    }

    fn z_score(&self, session: &SessionCounters, historical: &HistoricalStats) -> f64 {
        historical.error_rate_z(session)
    }
}

/// Rework rate well above the historical norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighReworkRate;

impl HighReworkRate {
    const MIN_EDITS: u64 = 5;
}

impl PatternRule for HighReworkRate {
    fn name(&self) -> &'static str {
        "high_rework_rate"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Quality
    }

    fn fallback_command(&self) -> &'static str {
        "/review:diff"
    }

    fn evaluate(&self, session: &SessionCounters, historical: &HistoricalStats) -> RuleResult<bool> {
        if session.file_edits < Self::MIN_EDITS {
            return Ok(false);
        }
        ensure_within("reworks", session.reworks, session.file_edits)?;
        Ok(self.z_score(session, historical) > ANOMALY_Z)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "{} of {} edits reworked code you had just written ({} vs your usual {}). Review the diff before editing more.",
            session.reworks,
            session.file_edits,
            percent(rework_rate(session)),
            percent(historical.avg_rework_rate)
        ))
    }

    fn evidence(&self, session: &SessionCounters, historical: &HistoricalStats) -> String {
        format!(
            "rework rate {} vs baseline {} (z={:.1})",
            percent(rework_rate(session)),
            percent(historical.avg_rework_rate),
            self.z_score(session, historical)
        )
    }

    fn z_score(&self, session: &SessionCounters, historical: &HistoricalStats) -> f64 {
        historical.rework_rate_z(session)
    }
}

// ============================================================================
// Threshold Rules
// ============================================================================

/// Most recent test runs are failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTests;

impl FailingTests {
    const MIN_RUNS: u64 = 3;
    const PASS_FLOOR: f64 = 0.5;
}

impl PatternRule for FailingTests {
    fn name(&self) -> &'static str {
        "failing_tests"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Testing
    }

    fn fallback_command(&self) -> &'static str {
        "/test:fix"
    }

    fn evaluate(&self, session: &SessionCounters, _historical: &HistoricalStats) -> RuleResult<bool> {
        if session.test_runs < Self::MIN_RUNS {
            return Ok(false);
        }
        ensure_within("testsPassed", session.tests_passed, session.test_runs)?;
        Ok(test_pass_rate(session) < Self::PASS_FLOOR)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        _historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "Only {} of {} test runs passed this session. Fix the failing tests before adding more changes.",
            session.tests_passed, session.test_runs
        ))
    }

    fn evidence(&self, session: &SessionCounters, _historical: &HistoricalStats) -> String {
        format!("test pass rate {}", percent(test_pass_rate(session)))
    }

    fn z_score(&self, session: &SessionCounters, _historical: &HistoricalStats) -> f64 {
        // Distance below the floor, scaled so a fully failing session scores ~3.
        z_score(Self::PASS_FLOOR, test_pass_rate(session), 1.0 / 6.0).max(0.0)
    }
}

/// Many edits with no test run at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntestedEdits;

impl UntestedEdits {
    const MIN_EDITS: u64 = 10;
}

impl PatternRule for UntestedEdits {
    fn name(&self) -> &'static str {
        "untested_edits"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Testing
    }

    fn fallback_command(&self) -> &'static str {
        "/test:run"
    }

    fn evaluate(&self, session: &SessionCounters, _historical: &HistoricalStats) -> RuleResult<bool> {
        Ok(session.file_edits >= Self::MIN_EDITS && session.test_runs == 0)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        _historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "{} file edits and no test runs yet. Run the tests to catch regressions early.",
            session.file_edits
        ))
    }

    fn evidence(&self, session: &SessionCounters, _historical: &HistoricalStats) -> String {
        format!("{} edits, 0 test runs", session.file_edits)
    }
}

/// One file edited or reworked far more than the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileChurn;

impl FileChurn {
    const MAX_EDITS: u64 = 8;
    const MAX_REWORKS: u64 = 4;
}

impl PatternRule for FileChurn {
    fn name(&self) -> &'static str {
        "file_churn"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Quality
    }

    fn fallback_command(&self) -> &'static str {
        "/refactor:plan"
    }

    fn evaluate(&self, session: &SessionCounters, _historical: &HistoricalStats) -> RuleResult<bool> {
        Ok(session.max_edits_per_file >= Self::MAX_EDITS
            || session.max_reworks_per_file >= Self::MAX_REWORKS)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        _historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "A single file has been edited {} times and reworked {} times. Step back and plan the change.",
            session.max_edits_per_file, session.max_reworks_per_file
        ))
    }

    fn evidence(&self, session: &SessionCounters, _historical: &HistoricalStats) -> String {
        format!(
            "max {} edits / {} reworks on one file",
            session.max_edits_per_file, session.max_reworks_per_file
        )
    }
}

/// Context window nearly full.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPressure;

impl ContextPressure {
    const THRESHOLD: f64 = 0.80;

    fn usage(session: &SessionCounters) -> RuleResult<Option<f64>> {
        match session.context_usage {
            None => Ok(None),
            Some(usage) if usage.is_finite() && (0.0..=1.0).contains(&usage) => Ok(Some(usage)),
            Some(usage) => Err(RuleError::InvalidCounter {
                name: "contextUsage".to_string(),
                value: usage,
            }),
        }
    }
}

impl PatternRule for ContextPressure {
    fn name(&self) -> &'static str {
        "context_pressure"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Context
    }

    fn fallback_command(&self) -> &'static str {
        "/context:compact"
    }

    fn evaluate(&self, session: &SessionCounters, _historical: &HistoricalStats) -> RuleResult<bool> {
        Ok(Self::usage(session)?.is_some_and(|usage| usage >= Self::THRESHOLD))
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        _historical: &HistoricalStats,
    ) -> RuleResult<String> {
        let usage = Self::usage(session)?.ok_or_else(|| RuleError::MissingCounter {
            name: "contextUsage".to_string(),
        })?;
        Ok(format!(
            "Context window is {} full. Compact it before the next large task.",
            percent(usage)
        ))
    }

    fn evidence(&self, session: &SessionCounters, _historical: &HistoricalStats) -> String {
        match session.context_usage {
            Some(usage) => format!("context usage {}", percent(usage)),
            None => "context usage unknown".to_string(),
        }
    }

    fn context_match(&self, session: &SessionCounters) -> f64 {
        session.context_usage.unwrap_or(0.0)
    }

    fn confidence_penalty(&self) -> f64 {
        // Usage is estimated from token counts, not measured.
        0.15
    }
}

/// Session has run long enough that a handoff is worth considering.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongSession;

impl LongSession {
    const MIN_SECONDS: u64 = 2 * 60 * 60;
}

impl PatternRule for LongSession {
    fn name(&self) -> &'static str {
        "long_session"
    }

    fn category(&self) -> TipCategory {
        TipCategory::Workflow
    }

    fn fallback_command(&self) -> &'static str {
        "/session:handoff"
    }

    fn evaluate(&self, session: &SessionCounters, _historical: &HistoricalStats) -> RuleResult<bool> {
        Ok(session.duration_seconds >= Self::MIN_SECONDS)
    }

    fn build_message(
        &self,
        session: &SessionCounters,
        _historical: &HistoricalStats,
    ) -> RuleResult<String> {
        Ok(format!(
            "This session has been running for {}h{:02}m. Review the plan or hand off to a fresh session.",
            session.duration_seconds / 3600,
            (session.duration_seconds % 3600) / 60
        ))
    }

    fn evidence(&self, session: &SessionCounters, _historical: &HistoricalStats) -> String {
        format!("{} minutes elapsed", session.duration_seconds / 60)
    }
}
