//! Local, append-only persistence for telemetry.
//!
//! The store is the single source of truth: metrics are appended to a JSONL
//! log, while the current session state and context statistics are single
//! JSON snapshots replaced wholesale on every save. Every public operation
//! reports failure as `false`/`None`/empty and never returns an error, so a
//! broken disk degrades telemetry instead of failing the calling hook.

pub mod jsonl;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StorageResult;

/// Metrics log file name.
pub const METRICS_FILE: &str = "metrics.jsonl";
/// Session state snapshot file name.
pub const SESSION_STATE_FILE: &str = "session_state.json";
/// Context stats snapshot file name.
pub const CONTEXT_STATS_FILE: &str = "context_stats.json";

/// Tag map attached to metrics and exported points.
pub type Tags = BTreeMap<String, String>;

/// One recorded fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// When the fact was recorded.
    pub timestamp: DateTime<Utc>,
    /// Metric name.
    pub name: String,
    /// Scalar or nested object value.
    pub value: Value,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Tags,
}

impl MetricEntry {
    /// Create an entry stamped with the current time.
    pub fn new(name: impl Into<String>, value: Value, tags: Tags) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            value,
            tags,
        }
    }
}

/// Raw session counters supplied by the orchestration layer.
///
/// Unknown counters are preserved in `extra` so that snapshots round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionCounters {
    pub tool_calls: u64,
    pub errors: u64,
    pub file_edits: u64,
    pub reworks: u64,
    pub test_runs: u64,
    pub tests_passed: u64,
    pub duration_seconds: u64,
    /// Highest edit count observed on a single file.
    pub max_edits_per_file: u64,
    /// Highest rework count observed on a single file.
    pub max_reworks_per_file: u64,
    /// Fraction of the context window in use (0.0 - 1.0), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_usage: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Latest snapshot of an in-progress session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(flatten)]
    pub counters: SessionCounters,
    pub saved_at: DateTime<Utc>,
}

impl SessionState {
    /// Wrap counters in a snapshot stamped now.
    pub fn new(counters: SessionCounters) -> Self {
        Self {
            session_id: None,
            project: None,
            counters,
            saved_at: Utc::now(),
        }
    }

    /// Attach the session identifier.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the project name.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

/// Latest snapshot of context-window usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
    pub saved_at: DateTime<Utc>,
}

impl ContextStats {
    /// Create a snapshot stamped now.
    pub fn new(fields: BTreeMap<String, f64>) -> Self {
        Self {
            fields,
            saved_at: Utc::now(),
        }
    }

    /// Look up a numeric field.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }
}

/// JSONL-backed local store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `base_dir`. Nothing is created until the first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Base directory of this store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the metrics log.
    pub fn metrics_path(&self) -> PathBuf {
        self.base_dir.join(METRICS_FILE)
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Append one metric. Returns `false` on any I/O failure.
    pub fn save_metric(&self, name: &str, value: Value, tags: Tags) -> bool {
        let entry = MetricEntry::new(name, value, tags);
        self.append_metric(&entry)
    }

    /// Append a prebuilt entry. Returns `false` on any I/O failure.
    pub fn append_metric(&self, entry: &MetricEntry) -> bool {
        report(
            "save_metric",
            jsonl::append_line(&self.metrics_path(), entry),
        )
        .is_some()
    }

    /// Load up to `limit` entries named `name`, most recent first.
    pub fn load_metric(&self, name: &str, limit: usize) -> Vec<MetricEntry> {
        report(
            "load_metric",
            jsonl::scan_rev(&self.metrics_path(), limit, |e: &MetricEntry| e.name == name),
        )
        .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Session state
    // ------------------------------------------------------------------

    /// Replace the session snapshot, stamping `savedAt` with the current time.
    pub fn save_session_state(&self, state: &SessionState) -> bool {
        let mut stamped = state.clone();
        stamped.saved_at = Utc::now();
        self.write_snapshot(SESSION_STATE_FILE, &stamped)
    }

    /// Load the session snapshot, if one exists and parses.
    pub fn load_session_state(&self) -> Option<SessionState> {
        self.read_snapshot(SESSION_STATE_FILE)
    }

    /// Delete the session snapshot.
    pub fn clear_session_state(&self) -> bool {
        self.remove_snapshot(SESSION_STATE_FILE)
    }

    // ------------------------------------------------------------------
    // Context stats
    // ------------------------------------------------------------------

    /// Replace the context snapshot, stamping `savedAt` with the current time.
    pub fn save_context_stats(&self, stats: &ContextStats) -> bool {
        let mut stamped = stats.clone();
        stamped.saved_at = Utc::now();
        self.write_snapshot(CONTEXT_STATS_FILE, &stamped)
    }

    /// Load the context snapshot, if one exists and parses.
    pub fn load_context_stats(&self) -> Option<ContextStats> {
        self.read_snapshot(CONTEXT_STATS_FILE)
    }

    /// Delete the context snapshot.
    pub fn clear_context_stats(&self) -> bool {
        self.remove_snapshot(CONTEXT_STATS_FILE)
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    fn write_snapshot<T: Serialize>(&self, file: &str, value: &T) -> bool {
        report(file, jsonl::write_json(&self.base_dir.join(file), value)).is_some()
    }

    fn read_snapshot<T: serde::de::DeserializeOwned>(&self, file: &str) -> Option<T> {
        report(file, jsonl::read_json(&self.base_dir.join(file))).flatten()
    }

    fn remove_snapshot(&self, file: &str) -> bool {
        report(file, jsonl::remove(&self.base_dir.join(file))).is_some()
    }
}

/// Absorb a storage error into `None`, logging the cause.
fn report<T>(op: &str, result: StorageResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(crate::error::StorageError::Json(e)) => {
            debug!(op = op, error = %e, "Skipping unparseable local data");
            None
        }
        Err(e) => {
            warn!(op = op, error = %e, "Local telemetry store operation failed");
            None
        }
    }
}
