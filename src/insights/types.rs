//! Core types for the recommendation engine.
//!
//! - [`TipCategory`]: which kind of problem a rule detects
//! - [`RiskLevel`] / [`CostLevel`]: fixed weights used when ranking commands
//! - [`HistoricalStats`]: baselines the anomaly scorer compares against
//! - [`Tip`]: one ranked recommendation

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::anomaly::{
    BASELINE_ERROR_RATE, BASELINE_ERROR_STDDEV, BASELINE_REWORK_RATE, BASELINE_REWORK_STDDEV,
};

// ============================================================================
// Categories and Levels
// ============================================================================

/// Problem area a rule belongs to. Each category has its own command registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TipCategory {
    /// Risk of losing work
    Safety,
    /// Code is being rewritten more than usual
    Quality,
    /// Tests are failing or missing
    Testing,
    /// Context window is filling up
    Context,
    /// Session pacing and handoff
    Workflow,
}

impl TipCategory {
    /// All categories in registry order.
    pub const ALL: [TipCategory; 5] = [
        TipCategory::Safety,
        TipCategory::Quality,
        TipCategory::Testing,
        TipCategory::Context,
        TipCategory::Workflow,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TipCategory::Safety => "safety",
            TipCategory::Quality => "quality",
            TipCategory::Testing => "testing",
            TipCategory::Context => "context",
            TipCategory::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for TipCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TipCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safety" => Ok(TipCategory::Safety),
            "quality" => Ok(TipCategory::Quality),
            "testing" => Ok(TipCategory::Testing),
            "context" => Ok(TipCategory::Context),
            "workflow" => Ok(TipCategory::Workflow),
            _ => Err(format!("Unknown tip category: {}", s)),
        }
    }
}

/// How much damage a command can do if it goes wrong.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Ranking multiplier; safer commands weigh more.
    pub fn weight(&self) -> f64 {
        match self {
            RiskLevel::None => 1.0,
            RiskLevel::Low => 0.8,
            RiskLevel::Medium => 0.5,
            RiskLevel::High => 0.2,
        }
    }
}

/// How expensive a command is to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CostLevel {
    None,
    Low,
    Medium,
    High,
}

impl CostLevel {
    /// Ranking multiplier; cheaper commands weigh more.
    pub fn weight(&self) -> f64 {
        match self {
            CostLevel::None => 1.0,
            CostLevel::Low => 0.8,
            CostLevel::Medium => 0.5,
            CostLevel::High => 0.2,
        }
    }
}

// ============================================================================
// Historical Baselines
// ============================================================================

/// Baseline statistics for anomaly scoring.
///
/// [`HistoricalStats::default`] carries fixed benchmark values and a session
/// count of zero; see [`HistoricalStats::from_sessions`] and
/// [`HistoricalStats::from_store`] for the derived form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalStats {
    pub avg_error_rate: f64,
    pub stddev_error_rate: f64,
    pub avg_rework_rate: f64,
    pub stddev_rework_rate: f64,
    /// Number of archived sessions the averages were computed from
    pub session_count: u64,
    /// Observed precision per rule name
    pub rule_accuracies: BTreeMap<String, f64>,
    /// Observed success rate per command
    pub command_success_rates: BTreeMap<String, f64>,
}

impl Default for HistoricalStats {
    fn default() -> Self {
        Self {
            avg_error_rate: BASELINE_ERROR_RATE,
            stddev_error_rate: BASELINE_ERROR_STDDEV,
            avg_rework_rate: BASELINE_REWORK_RATE,
            stddev_rework_rate: BASELINE_REWORK_STDDEV,
            session_count: 0,
            rule_accuracies: BTreeMap::new(),
            command_success_rates: BTreeMap::new(),
        }
    }
}

impl HistoricalStats {
    /// Whether any sessions have been archived.
    pub fn has_history(&self) -> bool {
        self.session_count > 0
    }

    /// Historical precision of `rule`, if known.
    pub fn rule_accuracy(&self, rule: &str) -> Option<f64> {
        self.rule_accuracies.get(rule).copied()
    }

    /// Historical success rate of `command`, if known.
    pub fn command_success_rate(&self, command: &str) -> Option<f64> {
        self.command_success_rates.get(command).copied()
    }
}

// ============================================================================
// Commands and Tips
// ============================================================================

/// One ranked option within a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandCandidate {
    pub command: String,
    pub risk: RiskLevel,
    pub cost: CostLevel,
    pub success_rate: f64,
    /// Whether `success_rate` came from history rather than the baseline
    pub historical: bool,
    /// Whether the caller reported this command as recently failed
    pub recently_failed: bool,
    pub score: f64,
}

/// Winner of a category ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSelection {
    pub command: String,
    pub score: f64,
    pub rationale: String,
}

/// One recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    pub rule_name: String,
    pub message: String,
    pub command: String,
    /// Always within `[0.10, 0.95]`
    pub confidence: f64,
    pub evidence: String,
    pub category: TipCategory,
    pub rationale: String,
}

/// A tip set waiting for the next session to pick it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTips {
    pub tips: Vec<Tip>,
    pub session_id: Option<String>,
    pub project: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Whether acting on a tip helped. Archived as a `tip_outcome` metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipOutcome {
    pub rule: String,
    pub command: String,
    pub success: bool,
}
