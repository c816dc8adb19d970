//! Per-source rotating debug logs for hook invocations.
//!
//! Each event-emitting source owns one JSONL file under `<base>/debug/`.
//! Every call appends one line, rotates the file once it exceeds its cap,
//! updates the in-memory [`StatsCache`], and starts a best-effort export of
//! the event. Each line carries a per-source sequence number continued from
//! the log itself, and every `statsExportInterval`-th event of a source also
//! exports its aggregate, even when every event comes from a new process.
//! None of these steps can fail the caller.

pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use stats::{percentile, HookStats, SourceStats, StatsCache, DURATION_WINDOW};

use crate::config::{Config, Settings};
use crate::store::jsonl;
use crate::telemetry::{remote_sink, spawn_detached, Point, PointSink};

/// Directory (under the base dir) holding the per-source logs.
pub const DEBUG_DIR: &str = "debug";
/// Table that individual events are exported to.
pub const EVENTS_TABLE: &str = "hook_events";
/// Table that periodic aggregates are exported to.
pub const STATS_TABLE: &str = "hook_stats";

/// Lifecycle event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEvent {
    Invoke,
    Output,
    Error,
}

impl HookEvent {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Invoke => "invoke",
            HookEvent::Output => "output",
            HookEvent::Error => "error",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invoke" => Ok(HookEvent::Invoke),
            "output" => Ok(HookEvent::Output),
            "error" => Ok(HookEvent::Error),
            _ => Err(format!("Unknown hook event: {}", s)),
        }
    }
}

/// One line of a source's debug log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInvocationLogEntry {
    pub ts: DateTime<Utc>,
    pub source: String,
    pub event: HookEvent,
    /// Per-source event number, continued across processes and rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookInvocationLogEntry {
    fn new(source: &str, event: HookEvent) -> Self {
        Self {
            ts: Utc::now(),
            source: source.to_string(),
            event,
            seq: None,
            input: None,
            output: None,
            duration_ms: None,
            success: None,
            error_type: None,
            error: None,
        }
    }
}

/// Rotating per-source debug log with cached aggregates.
pub struct DebugLog {
    dir: PathBuf,
    settings: Settings,
    cache: Arc<StatsCache>,
    sink: Option<Arc<dyn PointSink>>,
    pending: Mutex<Vec<JoinHandle<bool>>>,
}

impl DebugLog {
    /// Create a log writing under `dir` with no remote export.
    pub fn new(dir: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            dir: dir.into(),
            settings,
            cache: Arc::new(StatsCache::new()),
            sink: None,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a log under `<base>/debug` with export wired from configuration.
    pub fn from_config(config: &Config) -> Self {
        let settings = config.settings();
        let sink = remote_sink(config, &settings);
        let mut log = Self::new(config.storage.base_dir.join(DEBUG_DIR), settings);
        log.sink = sink;
        log
    }

    /// Export events and aggregates to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn PointSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing stats cache.
    pub fn with_cache(mut self, cache: Arc<StatsCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Directory holding the logs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for `source`.
    pub fn log_path(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize_source(source)))
    }

    /// Record that `source` was invoked with `input`.
    pub fn log_invocation(&self, source: &str, input: &Value) {
        let mut entry = HookInvocationLogEntry::new(source, HookEvent::Invoke);
        entry.input = Some(truncate_payload(input, self.settings.max_payload_bytes));
        self.append(entry);
    }

    /// Record the output of an invocation.
    pub fn log_output(
        &self,
        source: &str,
        output: &Value,
        duration_ms: u64,
        success: bool,
        error_type: Option<&str>,
    ) {
        let mut entry = HookInvocationLogEntry::new(source, HookEvent::Output);
        entry.output = Some(truncate_payload(output, self.settings.max_payload_bytes));
        entry.duration_ms = Some(duration_ms);
        entry.success = Some(success);
        entry.error_type = error_type.map(str::to_string);
        self.append(entry);
    }

    /// Record an invocation that failed outright.
    pub fn log_error(&self, source: &str, error: &str, duration_ms: u64) {
        let mut entry = HookInvocationLogEntry::new(source, HookEvent::Error);
        entry.error = Some(truncate_utf8(error, self.settings.max_payload_bytes).into_owned());
        entry.duration_ms = Some(duration_ms);
        entry.success = Some(false);
        self.append(entry);
    }

    /// Aggregated stats for `source`, replaying its log if the cache is cold.
    pub fn get_stats(&self, source: &str) -> HookStats {
        let key = sanitize_source(source);
        let path = self.log_path(source);
        self.cache.get_or_replay(&key, || replay_log(&path))
    }

    /// Aggregated stats for every source with a log, sorted by source.
    pub fn get_all_stats(&self) -> Vec<HookStats> {
        self.sources()
            .iter()
            .map(|source| self.get_stats(source))
            .collect()
    }

    /// Sources that currently have a log file, sorted.
    pub fn sources(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut sources: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        sources.sort();
        sources
    }

    /// Wait for every export started so far. Each is bounded by its own deadline.
    pub async fn flush(&self) -> usize {
        let handles: Vec<JoinHandle<bool>> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        let mut confirmed = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                confirmed += 1;
            }
        }
        confirmed
    }

    fn append(&self, mut entry: HookInvocationLogEntry) {
        if !self.settings.enabled {
            return;
        }

        let key = sanitize_source(&entry.source);
        let path = self.log_path(&entry.source);

        // Warms the cache from the log before the new line lands.
        let seq = self.cache.next_sequence(&key, || replay_log(&path));
        entry.seq = Some(seq);

        if let Err(e) = jsonl::append_line(&path, &entry) {
            warn!(source = %entry.source, error = %e, "Failed to append debug log entry");
            return;
        }
        match jsonl::rotate(&path, self.settings.max_log_entries) {
            Ok(true) => debug!(source = %entry.source, "Rotated debug log"),
            Ok(false) => {}
            Err(e) => warn!(source = %entry.source, error = %e, "Failed to rotate debug log"),
        }
        self.cache.apply_if_warm(&key, &entry);

        let Some(sink) = self.sink.clone() else {
            return;
        };

        self.spawn_export(Arc::clone(&sink), event_point(&entry));

        let interval = self.settings.stats_export_interval;
        if interval > 0 && seq % interval == 0 {
            let stats = self.cache.get_or_replay(&key, || replay_log(&path));
            self.spawn_export(sink, stats_point(&stats));
        }
    }

    fn spawn_export(&self, sink: Arc<dyn PointSink>, point: Point) {
        if let Some(handle) = spawn_detached(async move { sink.export_point(point).await }) {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }
}

fn replay_log(path: &Path) -> SourceStats {
    match jsonl::read_all::<HookInvocationLogEntry>(path) {
        Ok(entries) => SourceStats::replay(&entries),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Could not replay debug log");
            SourceStats::default()
        }
    }
}

fn event_point(entry: &HookInvocationLogEntry) -> Point {
    let mut point = Point::new(EVENTS_TABLE)
        .tag("source", entry.source.as_str())
        .tag("event", entry.event.as_str())
        .field("count", 1i64)
        .at(entry.ts);
    if let Some(ms) = entry.duration_ms {
        point = point.field("duration_ms", ms);
    }
    if let Some(success) = entry.success {
        point = point.field("success", success);
    }
    if let Some(error_type) = &entry.error_type {
        point = point.field("error_type", error_type.as_str());
    }
    point
}

fn stats_point(stats: &HookStats) -> Point {
    Point::new(STATS_TABLE)
        .tag("source", stats.source.as_str())
        .field("calls", stats.calls)
        .field("outputs", stats.outputs)
        .field("errors", stats.errors)
        .field("error_rate", stats.error_rate)
        .field("avg_duration", stats.avg_duration)
        .field("p95_duration", stats.p95_duration)
        .at(Utc::now())
}

/// Map a source id to a safe file stem.
pub fn sanitize_source(source: &str) -> String {
    let cleaned: String = source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Cut `s` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!("{}...[truncated {} bytes]", &s[..end], s.len() - end))
}

/// Bound a payload's serialized size before it is logged.
///
/// Payloads within budget pass through untouched; larger ones are replaced by
/// a truncated string rendering.
pub fn truncate_payload(value: &Value, max_bytes: usize) -> Value {
    let rendered = match value {
        Value::String(s) => std::borrow::Cow::Borrowed(s.as_str()),
        other => std::borrow::Cow::Owned(other.to_string()),
    };
    if rendered.len() <= max_bytes {
        return value.clone();
    }
    Value::String(truncate_utf8(&rendered, max_bytes).into_owned())
}
