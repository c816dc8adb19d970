//! Statistical tip engine.
//!
//! Session counters flow through the rate calculators and anomaly scorer into
//! the pattern rules. Each fired rule asks the command selector for the best
//! command in its category and gets a bounded confidence score. The ranked
//! tips are handed to the next session via [`SessionTipStore`].
//!
//! # Modules
//!
//! - [`types`]: categories, levels, [`HistoricalStats`], [`Tip`]
//! - [`rates`]: error, rework and test-pass rates
//! - [`anomaly`]: z-scores and baseline derivation
//! - [`commands`]: command registry and ranking
//! - [`confidence`]: multi-factor confidence
//! - [`rules`]: the [`PatternRule`] trait and built-in rules
//! - [`generator`]: tip generation and the end-of-session flow
//! - [`tip_store`]: pending tip persistence

pub mod anomaly;
pub mod commands;
pub mod confidence;
pub mod generator;
pub mod rates;
pub mod rules;
pub mod tip_store;
pub mod types;

pub use anomaly::{z_score, SESSION_SUMMARY_METRIC, TIP_OUTCOME_METRIC};
pub use commands::{rank, select_best, CommandSpec, REGISTRY};
pub use confidence::{calculate_confidence, ConfidenceInputs, MAX_CONFIDENCE, MIN_CONFIDENCE};
pub use generator::{
    end_session, generate_tips, record_tip_outcome, SessionEnd, TipGenerator, DEFAULT_MAX_TIPS,
};
pub use rates::{error_rate, rework_rate, test_pass_rate};
pub use rules::{default_rules, PatternRule};
pub use tip_store::{SessionTipStore, PENDING_TIPS_FILE};
pub use types::{
    CommandCandidate, CommandSelection, CostLevel, HistoricalStats, PendingTips, RiskLevel, Tip,
    TipCategory, TipOutcome,
};
