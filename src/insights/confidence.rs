//! Multi-factor tip confidence.
//!
//! ```text
//! raw        = statistical * 0.35 + sample_size * 0.15 + rule_accuracy * 0.30 + context * 0.20
//! confidence = clamp(0.10, 0.95, raw) * (1 - penalty)
//! ```
//!
//! The penalized value is clamped again so a tip never leaves `[0.10, 0.95]`.

use crate::store::SessionCounters;

/// Lowest confidence a tip can carry.
pub const MIN_CONFIDENCE: f64 = 0.10;
/// Highest confidence a tip can carry.
pub const MAX_CONFIDENCE: f64 = 0.95;
/// Rule precision assumed when none has been observed.
pub const DEFAULT_RULE_ACCURACY: f64 = 0.70;
/// Archived sessions at which the sample-size factor saturates.
pub const FULL_SAMPLE_SESSIONS: f64 = 20.0;
/// Tool calls at which the default context match saturates.
pub const FULL_CONTEXT_TOOL_CALLS: f64 = 20.0;

const STATISTICAL_WEIGHT: f64 = 0.35;
const SAMPLE_WEIGHT: f64 = 0.15;
const ACCURACY_WEIGHT: f64 = 0.30;
const CONTEXT_WEIGHT: f64 = 0.20;

/// Signals feeding one confidence score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInputs {
    pub z_score: f64,
    pub session_count: u64,
    pub rule_accuracy: Option<f64>,
    pub context_match: f64,
    pub penalty: f64,
}

impl Default for ConfidenceInputs {
    fn default() -> Self {
        Self {
            z_score: 0.0,
            session_count: 0,
            rule_accuracy: None,
            context_match: 0.0,
            penalty: 0.0,
        }
    }
}

/// Map anomaly magnitude to a probability-like score.
pub fn statistical_confidence(z: f64) -> f64 {
    if !z.is_finite() {
        return 0.99;
    }
    (0.5 + z.abs() * 0.15).min(0.99)
}

/// How much history backs the baseline.
pub fn sample_size_factor(session_count: u64) -> f64 {
    (session_count as f64 / FULL_SAMPLE_SESSIONS).min(1.0)
}

/// How much current-session evidence there is.
pub fn default_context_match(session: &SessionCounters) -> f64 {
    (session.tool_calls as f64 / FULL_CONTEXT_TOOL_CALLS).min(1.0)
}

/// Combine the inputs into a bounded score, rounded to two decimals.
pub fn calculate_confidence(inputs: &ConfidenceInputs) -> f64 {
    let accuracy = inputs
        .rule_accuracy
        .filter(|a| a.is_finite())
        .unwrap_or(DEFAULT_RULE_ACCURACY)
        .clamp(0.0, 1.0);
    let context = unit(inputs.context_match);
    let penalty = unit(inputs.penalty);

    let raw = statistical_confidence(inputs.z_score) * STATISTICAL_WEIGHT
        + sample_size_factor(inputs.session_count) * SAMPLE_WEIGHT
        + accuracy * ACCURACY_WEIGHT
        + context * CONTEXT_WEIGHT;

    let penalized = bound(raw) * (1.0 - penalty);
    (bound(penalized) * 100.0).round() / 100.0
}

fn bound(value: f64) -> f64 {
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistical_confidence() {
        assert_eq!(statistical_confidence(0.0), 0.5);
        assert!((statistical_confidence(-3.0) - 0.95).abs() < 1e-9);
        assert_eq!(statistical_confidence(10.0), 0.99);
    }

    #[test]
    fn test_sample_size_factor() {
        assert_eq!(sample_size_factor(0), 0.0);
        assert_eq!(sample_size_factor(10), 0.5);
        assert_eq!(sample_size_factor(500), 1.0);
    }

    #[test]
    fn test_strong_signal() {
        let confidence = calculate_confidence(&ConfidenceInputs {
            z_score: 3.0,
            session_count: 20,
            rule_accuracy: None,
            context_match: 1.0,
            penalty: 0.0,
        });
        assert_eq!(confidence, 0.89);
    }

    #[test]
    fn test_bounds_hold_for_extremes() {
        let high = calculate_confidence(&ConfidenceInputs {
            z_score: f64::INFINITY,
            session_count: u64::MAX,
            rule_accuracy: Some(1.0),
            context_match: 5.0,
            penalty: -1.0,
        });
        assert_eq!(high, MAX_CONFIDENCE);

        let low = calculate_confidence(&ConfidenceInputs {
            rule_accuracy: Some(0.0),
            penalty: 1.0,
            ..ConfidenceInputs::default()
        });
        assert_eq!(low, MIN_CONFIDENCE);
    }

    #[test]
    fn test_penalty_discounts() {
        let base = ConfidenceInputs {
            z_score: 2.0,
            session_count: 10,
            rule_accuracy: Some(0.8),
            context_match: 0.5,
            penalty: 0.0,
        };
        let full = calculate_confidence(&base);
        let discounted = calculate_confidence(&ConfidenceInputs {
            penalty: 0.2,
            ..base
        });
        assert!(discounted < full);
    }

    #[test]
    fn test_sweep_stays_in_range() {
        for z in [-10.0, -1.0, 0.0, 0.5, 4.0] {
            for sessions in [0, 5, 50] {
                for accuracy in [None, Some(0.0), Some(0.5), Some(1.0)] {
                    for penalty in [0.0, 0.3, 0.9] {
                        let c = calculate_confidence(&ConfidenceInputs {
                            z_score: z,
                            session_count: sessions,
                            rule_accuracy: accuracy,
                            context_match: 0.7,
                            penalty,
                        });
                        assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c), "{c}");
                    }
                }
            }
        }
    }
}
