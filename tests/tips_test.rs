//! Integration tests for the tip engine
//!
//! Covers the end-to-end scenarios: anomaly-triggered tips, quiet sessions,
//! ranking invariants, and the session lifecycle through the local store.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use serde_json::json;

use hook_insights::config::Settings;
use hook_insights::insights::{
    end_session, generate_tips, record_tip_outcome, select_best, HistoricalStats, SessionTipStore,
    TipCategory, TipGenerator, TipOutcome, MAX_CONFIDENCE, MIN_CONFIDENCE, SESSION_SUMMARY_METRIC,
};
use hook_insights::store::{LocalStore, SessionCounters, SessionState, Tags};
use hook_insights::telemetry::Recorder;

fn error_session(tool_calls: u64, errors: u64) -> SessionCounters {
    SessionCounters {
        tool_calls,
        errors,
        ..Default::default()
    }
}

/// Benchmark baseline backed by enough history for full sample weight.
fn seasoned_baseline() -> HistoricalStats {
    HistoricalStats {
        session_count: 20,
        ..HistoricalStats::default()
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quarter_error_rate_recommends_checkpoint() {
        let tips = generate_tips(&error_session(100, 25), &seasoned_baseline());

        let tip = tips
            .iter()
            .find(|t| t.rule_name == "high_error_rate")
            .expect("high_error_rate should fire");
        assert_eq!(tip.category, TipCategory::Safety);
        assert_eq!(tip.command, "/undo:checkpoint");
        assert!(tip.confidence >= 0.80, "confidence {}", tip.confidence);
        assert!(tip.evidence.contains("z=3.0"));
    }

    #[test]
    fn test_without_history_confidence_is_lower() {
        let seasoned = generate_tips(&error_session(100, 25), &seasoned_baseline());
        let fresh = generate_tips(&error_session(100, 25), &HistoricalStats::default());
        assert_eq!(fresh[0].rule_name, "high_error_rate");
        assert!(fresh[0].confidence < seasoned[0].confidence);
    }

    #[test]
    fn test_quarter_error_rate_with_default_baseline() {
        // statistical 0.95 * 0.35 + sample 0 + accuracy 0.70 * 0.30 + context 1.0 * 0.20
        let tips = generate_tips(&error_session(100, 25), &HistoricalStats::default());
        assert_eq!(tips[0].rule_name, "high_error_rate");
        assert_eq!(tips[0].command, "/undo:checkpoint");
        assert_eq!(tips[0].confidence, 0.74);
    }

    #[test]
    fn test_no_tool_calls_no_error_tip() {
        let tips = generate_tips(&error_session(0, 0), &HistoricalStats::default());
        assert!(tips.iter().all(|t| t.rule_name != "high_error_rate"));
        assert!(tips.is_empty());
    }

    #[test]
    fn test_failed_command_changes_recommendation() {
        let generator = TipGenerator::default();
        let tips = generator.generate(
            &error_session(100, 25),
            &seasoned_baseline(),
            &["/undo:checkpoint".to_string()],
        );
        assert_eq!(tips[0].command, "/git:stash");
        assert!(tips[0].rationale.contains("baseline"));
        assert!(tips[0].message.ends_with("Try /git:stash."));
        assert!(!tips[0].message.contains("checkpoint"));
    }
}

#[cfg(test)]
mod invariant_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn noisy_sessions() -> Vec<SessionCounters> {
        let mut sessions = Vec::new();
        for tool_calls in [0u64, 5, 40, 200] {
            for errors in [0u64, 1, 10, 60] {
                sessions.push(SessionCounters {
                    tool_calls,
                    errors: errors.min(tool_calls),
                    file_edits: tool_calls / 2,
                    reworks: errors / 2,
                    test_runs: errors % 4,
                    tests_passed: 0,
                    max_edits_per_file: errors,
                    context_usage: Some((errors as f64 / 60.0).min(1.0)),
                    duration_seconds: tool_calls * 60,
                    ..Default::default()
                });
            }
        }
        sessions
    }

    #[test]
    fn test_confidence_bounds_and_unique_commands() {
        for historical in [HistoricalStats::default(), seasoned_baseline()] {
            for session in noisy_sessions() {
                let tips = generate_tips(&session, &historical);
                assert!(tips.len() <= 5);

                let commands: HashSet<_> = tips.iter().map(|t| t.command.as_str()).collect();
                assert_eq!(commands.len(), tips.len(), "duplicate command in {tips:?}");

                for tip in &tips {
                    assert!(
                        (MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&tip.confidence),
                        "{tip:?}"
                    );
                }
                assert!(tips.windows(2).all(|w| w[0].confidence >= w[1].confidence));
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        for session in noisy_sessions() {
            let a = generate_tips(&session, &seasoned_baseline());
            let b = generate_tips(&session, &seasoned_baseline());
            assert_eq!(a, b);
        }
        for category in TipCategory::ALL {
            assert_eq!(
                select_best(category, &seasoned_baseline(), &[]),
                select_best(category, &seasoned_baseline(), &[])
            );
        }
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn local_recorder(dir: &std::path::Path) -> Recorder {
        Recorder::new(LocalStore::new(dir), None, Settings::default())
    }

    #[test]
    fn test_end_session_flow() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = local_recorder(dir.path());
        let store = recorder.store();

        let state = SessionState::new(error_session(100, 25))
            .with_session("s-42")
            .with_project("demo");
        assert!(store.save_session_state(&state));

        let ended = end_session(&recorder, &TipGenerator::default(), &[]).unwrap();
        assert!(ended.tips_saved);
        assert!(ended.archive.saved);
        assert_eq!(ended.tips[0].command, "/undo:checkpoint");

        assert!(store.load_session_state().is_none());
        assert!(store.load_context_stats().is_none());

        let archived = store.load_metric(SESSION_SUMMARY_METRIC, 1);
        assert_eq!(archived[0].value["toolCalls"], 100);
        assert_eq!(archived[0].value["errorRate"], 0.25);
        assert_eq!(archived[0].tags.get("session_id").map(String::as_str), Some("s-42"));

        let pending = SessionTipStore::new(dir.path()).take().unwrap();
        assert_eq!(pending.session_id.as_deref(), Some("s-42"));
        assert_eq!(pending.project.as_deref(), Some("demo"));
        assert_eq!(pending.tips, ended.tips);

        // Nothing left to end.
        assert!(end_session(&recorder, &TipGenerator::default(), &[]).is_none());
    }

    #[test]
    fn test_history_feeds_back_into_baselines() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = local_recorder(dir.path());

        for errors in [20, 25, 30] {
            recorder.record(
                SESSION_SUMMARY_METRIC,
                json!({"toolCalls": 100, "errors": errors}),
                Tags::new(),
            );
        }
        for success in [false, false, false] {
            record_tip_outcome(
                &recorder,
                &TipOutcome {
                    rule: "high_error_rate".to_string(),
                    command: "/undo:checkpoint".to_string(),
                    success,
                },
            );
        }

        let historical = HistoricalStats::from_store(recorder.store());
        assert_eq!(historical.session_count, 3);
        assert!((historical.avg_error_rate - 0.25).abs() < 1e-9);
        assert_eq!(historical.rule_accuracy("high_error_rate"), Some(0.0));
        assert_eq!(historical.command_success_rate("/undo:checkpoint"), Some(0.0));

        // A 25% error rate is now normal for this user.
        let tips = generate_tips(&error_session(100, 25), &historical);
        assert!(tips.iter().all(|t| t.rule_name != "high_error_rate"));
    }
}
