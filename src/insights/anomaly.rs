//! Z-score anomaly scoring and historical baseline derivation.
//!
//! Baselines come from archived `session_summary` metrics. Until enough
//! sessions exist, fixed benchmark values stand in: an error rate of
//! 10% ± 5% and a rework rate of 15% ± 8%.

use std::collections::BTreeMap;

use tracing::debug;

use super::rates::{error_rate, rework_rate};
use super::types::{HistoricalStats, TipOutcome};
use crate::store::{LocalStore, SessionCounters};

/// Benchmark mean error rate.
pub const BASELINE_ERROR_RATE: f64 = 0.10;
/// Benchmark error rate standard deviation.
pub const BASELINE_ERROR_STDDEV: f64 = 0.05;
/// Benchmark mean rework rate.
pub const BASELINE_REWORK_RATE: f64 = 0.15;
/// Benchmark rework rate standard deviation.
pub const BASELINE_REWORK_STDDEV: f64 = 0.08;

/// Metric name under which finished sessions are archived.
pub const SESSION_SUMMARY_METRIC: &str = "session_summary";
/// Metric name under which tip feedback is archived.
pub const TIP_OUTCOME_METRIC: &str = "tip_outcome";

/// Archived sessions needed before derived means replace the benchmarks.
pub const MIN_BASELINE_SESSIONS: usize = 3;
/// Outcomes needed before a rule accuracy or command success rate is trusted.
pub const MIN_OUTCOME_SAMPLES: usize = 3;
/// How many archived sessions to look back over.
pub const HISTORY_LIMIT: usize = 50;
/// How many tip outcomes to look back over.
pub const OUTCOME_LIMIT: usize = 200;

/// `(value - mean) / stddev`, or `0.0` when the variance is zero or undefined.
pub fn z_score(value: f64, mean: f64, stddev: f64) -> f64 {
    if stddev == 0.0 || !stddev.is_finite() {
        return 0.0;
    }
    let z = (value - mean) / stddev;
    if z.is_finite() {
        z
    } else {
        0.0
    }
}

/// Mean and population standard deviation. `(0, 0)` for an empty slice.
pub fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl HistoricalStats {
    /// Derive error and rework baselines from archived sessions.
    ///
    /// With fewer than [`MIN_BASELINE_SESSIONS`] sessions the benchmark
    /// values are kept, but `session_count` still reflects what was seen.
    pub fn from_sessions(sessions: &[SessionCounters]) -> Self {
        let mut stats = Self {
            session_count: sessions.len() as u64,
            ..Self::default()
        };
        if sessions.len() < MIN_BASELINE_SESSIONS {
            return stats;
        }

        let errors: Vec<f64> = sessions
            .iter()
            .filter(|s| s.tool_calls > 0)
            .map(error_rate)
            .collect();
        if errors.len() >= MIN_BASELINE_SESSIONS {
            let (mean, stddev) = mean_stddev(&errors);
            stats.avg_error_rate = mean;
            stats.stddev_error_rate = stddev;
        }

        let reworks: Vec<f64> = sessions
            .iter()
            .filter(|s| s.file_edits > 0)
            .map(rework_rate)
            .collect();
        if reworks.len() >= MIN_BASELINE_SESSIONS {
            let (mean, stddev) = mean_stddev(&reworks);
            stats.avg_rework_rate = mean;
            stats.stddev_rework_rate = stddev;
        }

        stats
    }

    /// Fold tip feedback into per-rule accuracy and per-command success rates.
    pub fn with_outcomes(mut self, outcomes: &[TipOutcome]) -> Self {
        let mut rules: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut commands: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for outcome in outcomes {
            for (map, key) in [
                (&mut rules, outcome.rule.as_str()),
                (&mut commands, outcome.command.as_str()),
            ] {
                let counts = map.entry(key).or_insert((0, 0));
                counts.1 += 1;
                if outcome.success {
                    counts.0 += 1;
                }
            }
        }

        self.rule_accuracies.extend(trusted_rates(rules));
        self.command_success_rates.extend(trusted_rates(commands));
        self
    }

    /// Build baselines from what the local store has archived.
    ///
    /// Malformed archived entries are skipped; an empty store yields the
    /// defaults.
    pub fn from_store(store: &LocalStore) -> Self {
        let sessions: Vec<SessionCounters> = store
            .load_metric(SESSION_SUMMARY_METRIC, HISTORY_LIMIT)
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry.value).ok())
            .collect();
        let outcomes: Vec<TipOutcome> = store
            .load_metric(TIP_OUTCOME_METRIC, OUTCOME_LIMIT)
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry.value).ok())
            .collect();

        debug!(
            sessions = sessions.len(),
            outcomes = outcomes.len(),
            "Derived historical baselines"
        );
        Self::from_sessions(&sessions).with_outcomes(&outcomes)
    }

    /// Z-score of the session's error rate against this baseline.
    pub fn error_rate_z(&self, session: &SessionCounters) -> f64 {
        z_score(error_rate(session), self.avg_error_rate, self.stddev_error_rate)
    }

    /// Z-score of the session's rework rate against this baseline.
    pub fn rework_rate_z(&self, session: &SessionCounters) -> f64 {
        z_score(rework_rate(session), self.avg_rework_rate, self.stddev_rework_rate)
    }
}

fn trusted_rates<'a>(
    counts: BTreeMap<&'a str, (usize, usize)>,
) -> impl Iterator<Item = (String, f64)> + 'a {
    counts
        .into_iter()
        .filter(|(_, (_, total))| *total >= MIN_OUTCOME_SAMPLES)
        .map(|(key, (hits, total))| (key.to_string(), hits as f64 / total as f64))
}
