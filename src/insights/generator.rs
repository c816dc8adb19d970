//! Tip generation and the end-of-session flow.
//!
//! Rules are evaluated in registry order. Each fired rule yields one tip whose
//! command comes from its category's ranking. The result is sorted by
//! confidence, reduced to one tip per command, and capped.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::anomaly::{SESSION_SUMMARY_METRIC, TIP_OUTCOME_METRIC};
use super::commands::select_best;
use super::confidence::{calculate_confidence, ConfidenceInputs};
use super::rates::{error_rate, rework_rate, test_pass_rate};
use super::rules::{default_rules, PatternRule};
use super::tip_store::SessionTipStore;
use super::types::{HistoricalStats, Tip, TipOutcome};
use crate::error::RuleResult;
use crate::store::{SessionCounters, SessionState, Tags};
use crate::telemetry::{RecordOutcome, Recorder};

/// Default cap on tips per session.
pub const DEFAULT_MAX_TIPS: usize = 5;

/// Evaluates a fixed rule set into ranked tips.
pub struct TipGenerator {
    rules: Vec<Box<dyn PatternRule>>,
    max_tips: usize,
}

impl Default for TipGenerator {
    fn default() -> Self {
        Self::new(default_rules(), DEFAULT_MAX_TIPS)
    }
}

impl TipGenerator {
    /// Create a generator over `rules`.
    pub fn new(rules: Vec<Box<dyn PatternRule>>, max_tips: usize) -> Self {
        Self { rules, max_tips }
    }

    /// The built-in rules with a custom cap.
    pub fn with_max_tips(max_tips: usize) -> Self {
        Self::new(default_rules(), max_tips)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Box<dyn PatternRule>] {
        &self.rules
    }

    /// Evaluate every rule and return the ranked, deduplicated tips.
    pub fn generate(
        &self,
        session: &SessionCounters,
        historical: &HistoricalStats,
        failed_commands: &[String],
    ) -> Vec<Tip> {
        let mut tips: Vec<Tip> = self
            .rules
            .iter()
            .filter_map(|rule| match build_tip(rule.as_ref(), session, historical, failed_commands) {
                Ok(tip) => tip,
                Err(e) => {
                    debug!(rule = rule.name(), error = %e, "Skipping rule");
                    None
                }
            })
            .collect();

        tips.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut seen = HashSet::new();
        tips.retain(|tip| seen.insert(tip.command.clone()));
        tips.truncate(self.max_tips);
        tips
    }
}

/// Generate tips with the built-in rules and no failed commands.
pub fn generate_tips(session: &SessionCounters, historical: &HistoricalStats) -> Vec<Tip> {
    TipGenerator::default().generate(session, historical, &[])
}

fn build_tip(
    rule: &dyn PatternRule,
    session: &SessionCounters,
    historical: &HistoricalStats,
    failed_commands: &[String],
) -> RuleResult<Option<Tip>> {
    if !rule.evaluate(session, historical)? {
        return Ok(None);
    }
    let message = rule.build_message(session, historical)?;

    let (command, rationale) = match select_best(rule.category(), historical, failed_commands) {
        Some(selection) => (selection.command, selection.rationale),
        None => (
            rule.fallback_command().to_string(),
            "no ranked candidates; using the rule's default".to_string(),
        ),
    };

    let confidence = calculate_confidence(&ConfidenceInputs {
        z_score: rule.z_score(session, historical),
        session_count: historical.session_count,
        rule_accuracy: historical.rule_accuracy(rule.name()),
        context_match: rule.context_match(session),
        penalty: rule.confidence_penalty(),
    });

    Ok(Some(Tip {
        rule_name: rule.name().to_string(),
        message: format!("{} Try {}.", message, command),
        command,
        confidence,
        evidence: rule.evidence(session, historical),
        category: rule.category(),
        rationale,
    }))
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Result of [`end_session`].
#[derive(Debug)]
pub struct SessionEnd {
    pub session_id: Option<String>,
    pub project: Option<String>,
    pub tips: Vec<Tip>,
    /// Whether the tips reached the pending tip store
    pub tips_saved: bool,
    /// Archive of the session counters as `session_summary`
    pub archive: RecordOutcome,
}

/// Close out the saved session.
///
/// Loads the session snapshot, derives baselines from history, generates and
/// stores tips for the next session, archives the counters, and clears the
/// session and context snapshots. Returns `None` when no session was saved.
pub fn end_session(
    recorder: &Recorder,
    generator: &TipGenerator,
    failed_commands: &[String],
) -> Option<SessionEnd> {
    let store = recorder.store();
    let state = store.load_session_state()?;

    // Baselines exclude the session being closed.
    let historical = HistoricalStats::from_store(store);
    let tips = generator.generate(&state.counters, &historical, failed_commands);

    let tip_store = SessionTipStore::new(store.base_dir());
    let tips_saved = tip_store.save(
        &tips,
        state.session_id.as_deref(),
        state.project.as_deref(),
    );

    let archive = recorder.record(
        SESSION_SUMMARY_METRIC,
        session_summary(&state, tips.len()),
        session_tags(&state),
    );

    store.clear_session_state();
    store.clear_context_stats();

    info!(
        session_id = state.session_id.as_deref().unwrap_or("-"),
        tips = tips.len(),
        archived = archive.saved,
        "Session ended"
    );

    Some(SessionEnd {
        session_id: state.session_id,
        project: state.project,
        tips,
        tips_saved,
        archive,
    })
}

/// Archive whether acting on a tip helped.
pub fn record_tip_outcome(recorder: &Recorder, outcome: &TipOutcome) -> RecordOutcome {
    let value = serde_json::to_value(outcome).unwrap_or(Value::Null);
    let mut tags = Tags::new();
    tags.insert("rule".to_string(), outcome.rule.clone());
    recorder.record(TIP_OUTCOME_METRIC, value, tags)
}

fn session_summary(state: &SessionState, tip_count: usize) -> Value {
    let mut value = serde_json::to_value(&state.counters).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("errorRate".to_string(), json!(error_rate(&state.counters)));
        map.insert("reworkRate".to_string(), json!(rework_rate(&state.counters)));
        map.insert("testPassRate".to_string(), json!(test_pass_rate(&state.counters)));
        map.insert("tipCount".to_string(), json!(tip_count));
    }
    value
}

fn session_tags(state: &SessionState) -> Tags {
    let mut tags = Tags::new();
    if let Some(id) = &state.session_id {
        tags.insert("session_id".to_string(), id.clone());
    }
    if let Some(project) = &state.project {
        tags.insert("project".to_string(), project.clone());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::insights::types::TipCategory;

    struct Broken;

    impl PatternRule for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn category(&self) -> TipCategory {
            TipCategory::Workflow
        }
        fn fallback_command(&self) -> &'static str {
            "/plan:review"
        }
        fn evaluate(&self, _: &SessionCounters, _: &HistoricalStats) -> RuleResult<bool> {
            Err(RuleError::MissingCounter {
                name: "anything".to_string(),
            })
        }
        fn build_message(&self, _: &SessionCounters, _: &HistoricalStats) -> RuleResult<String> {
            Ok(String::new())
        }
        fn evidence(&self, _: &SessionCounters, _: &HistoricalStats) -> String {
            String::new()
        }
    }

    fn busy_session() -> SessionCounters {
        SessionCounters {
            tool_calls: 100,
            errors: 25,
            file_edits: 20,
            reworks: 10,
            test_runs: 0,
            max_edits_per_file: 9,
            context_usage: Some(0.9),
            duration_seconds: 3 * 3600,
            ..Default::default()
        }
    }

    #[test]
    fn test_broken_rule_is_skipped() {
        let mut rules = default_rules();
        rules.insert(0, Box::new(Broken));
        let generator = TipGenerator::new(rules, 10);
        let tips = generator.generate(&busy_session(), &HistoricalStats::default(), &[]);
        assert!(!tips.is_empty());
        assert!(tips.iter().all(|t| t.rule_name != "broken"));
    }

    #[test]
    fn test_tips_sorted_unique_and_capped() {
        let generator = TipGenerator::with_max_tips(3);
        let tips = generator.generate(&busy_session(), &HistoricalStats::default(), &[]);
        assert_eq!(tips.len(), 3);
        assert!(tips.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        let commands: HashSet<_> = tips.iter().map(|t| &t.command).collect();
        assert_eq!(commands.len(), tips.len());
    }

    #[test]
    fn test_quiet_session_has_no_tips() {
        assert!(generate_tips(&SessionCounters::default(), &HistoricalStats::default()).is_empty());
    }

    #[test]
    fn test_session_summary_includes_rates() {
        let state = SessionState::new(SessionCounters {
            tool_calls: 10,
            errors: 1,
            ..Default::default()
        });
        let summary = session_summary(&state, 2);
        assert_eq!(summary["toolCalls"], 10);
        assert_eq!(summary["errorRate"], 0.1);
        assert_eq!(summary["tipCount"], 2);
    }
}
