//! Aggregated per-source hook statistics.
//!
//! [`StatsCache`] holds running counters and a sliding window of recent
//! durations per source. It is process-local and never persisted: a cold
//! entry is rebuilt by replaying the source's log once.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HookEvent, HookInvocationLogEntry};

/// Number of recent durations kept for average and p95.
pub const DURATION_WINDOW: usize = 100;

/// Aggregated view over one source's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookStats {
    pub source: String,
    pub calls: u64,
    pub outputs: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_duration: f64,
    pub p95_duration: f64,
    pub last_call: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
}

/// Running counters for one source.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    calls: u64,
    outputs: u64,
    errors: u64,
    /// Highest event sequence seen.
    events: u64,
    durations: VecDeque<f64>,
    last_call: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<DateTime<Utc>>,
}

impl SourceStats {
    /// Rebuild counters by replaying entries in append order.
    pub fn replay<'a>(entries: impl IntoIterator<Item = &'a HookInvocationLogEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.apply(entry);
        }
        stats
    }

    /// Fold one entry into the counters.
    pub fn apply(&mut self, entry: &HookInvocationLogEntry) {
        // Lines written before sequencing count one each.
        self.events = entry
            .seq
            .map_or(self.events + 1, |seq| seq.max(self.events));

        match entry.event {
            HookEvent::Invoke => {
                self.calls += 1;
                self.last_call = Some(entry.ts);
            }
            HookEvent::Output => {
                self.outputs += 1;
                if entry.success.unwrap_or(true) {
                    self.last_success = Some(entry.ts);
                } else {
                    self.errors += 1;
                    self.last_error = Some(entry.ts);
                }
            }
            HookEvent::Error => {
                self.errors += 1;
                self.last_error = Some(entry.ts);
            }
        }

        if let Some(ms) = entry.duration_ms {
            if self.durations.len() == DURATION_WINDOW {
                self.durations.pop_front();
            }
            self.durations.push_back(ms as f64);
        }
    }

    /// Sequence number the next event of this source should carry.
    pub fn next_sequence(&self) -> u64 {
        self.events + 1
    }

    /// Produce the public view.
    pub fn snapshot(&self, source: &str) -> HookStats {
        let durations: Vec<f64> = self.durations.iter().copied().collect();
        let avg_duration = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        HookStats {
            source: source.to_string(),
            calls: self.calls,
            outputs: self.outputs,
            errors: self.errors,
            // Failed outputs and error events can both count against one call.
            error_rate: if self.calls == 0 {
                0.0
            } else {
                (self.errors as f64 / self.calls as f64).min(1.0)
            },
            avg_duration,
            p95_duration: percentile(&durations, 0.95),
            last_call: self.last_call,
            last_success: self.last_success,
            last_error: self.last_error,
        }
    }
}

/// Nearest-rank percentile; `0.0` for an empty slice.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (sorted.len() as f64 * pct).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Injectable, process-local cache of [`SourceStats`] keyed by source id.
#[derive(Debug, Default)]
pub struct StatsCache {
    sources: Mutex<HashMap<String, SourceStats>>,
}

impl StatsCache {
    /// Create an empty (cold) cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `source` has been loaded.
    pub fn is_warm(&self, source: &str) -> bool {
        self.lock().contains_key(source)
    }

    /// Fold `entry` into a warm source. Returns `false` if the source is cold.
    pub fn apply_if_warm(&self, source: &str, entry: &HookInvocationLogEntry) -> bool {
        match self.lock().get_mut(source) {
            Some(stats) => {
                stats.apply(entry);
                true
            }
            None => false,
        }
    }

    /// Snapshot `source`, populating it with `replay` first if cold.
    pub fn get_or_replay<F>(&self, source: &str, replay: F) -> HookStats
    where
        F: FnOnce() -> SourceStats,
    {
        let mut sources = self.lock();
        sources
            .entry(source.to_string())
            .or_insert_with(replay)
            .snapshot(source)
    }

    /// Next event sequence for `source`, populating it with `replay` first if cold.
    pub fn next_sequence<F>(&self, source: &str, replay: F) -> u64
    where
        F: FnOnce() -> SourceStats,
    {
        let mut sources = self.lock();
        sources
            .entry(source.to_string())
            .or_insert_with(replay)
            .next_sequence()
    }

    /// Drop the cached entry for `source`.
    pub fn invalidate(&self, source: &str) {
        self.lock().remove(source);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SourceStats>> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(event: HookEvent, duration_ms: Option<u64>, success: Option<bool>) -> HookInvocationLogEntry {
        HookInvocationLogEntry {
            ts: Utc::now(),
            source: "pre-tool".to_string(),
            event,
            seq: None,
            input: None,
            output: None,
            duration_ms,
            success,
            error_type: None,
            error: None,
        }
    }

    #[test]
    fn test_percentile() {
        assert_eq!(percentile(&[], 0.95), 0.0);
        assert_eq!(percentile(&[7.0], 0.95), 7.0);
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.95), 95.0);
        assert_eq!(percentile(&[5.0, 1.0, 3.0], 0.5), 3.0);
    }

    #[test]
    fn test_source_stats_counts() {
        let stats = SourceStats::replay(&[
            entry(HookEvent::Invoke, None, None),
            entry(HookEvent::Output, Some(10), Some(true)),
            entry(HookEvent::Invoke, None, None),
            entry(HookEvent::Output, Some(30), Some(false)),
            entry(HookEvent::Invoke, None, None),
            entry(HookEvent::Error, Some(20), None),
        ]);
        let view = stats.snapshot("pre-tool");

        assert_eq!(view.calls, 3);
        assert_eq!(view.outputs, 2);
        assert_eq!(view.errors, 2);
        assert!((view.error_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((view.avg_duration - 20.0).abs() < 1e-9);
        assert_eq!(view.p95_duration, 30.0);
        assert!(view.last_success.is_some());
        assert!(view.last_error.is_some());
    }

    #[test]
    fn test_duration_window_is_capped() {
        let mut stats = SourceStats::default();
        for ms in 0..250u64 {
            stats.apply(&entry(HookEvent::Output, Some(ms), Some(true)));
        }
        let view = stats.snapshot("s");
        // Only 150..250 remain in the window.
        assert!((view.avg_duration - 199.5).abs() < 1e-9);
        assert_eq!(view.outputs, 250);
    }

    #[test]
    fn test_zero_calls_has_zero_error_rate() {
        let stats = SourceStats::replay(&[entry(HookEvent::Error, Some(5), None)]);
        assert_eq!(stats.snapshot("s").error_rate, 0.0);
    }

    #[test]
    fn test_error_rate_is_capped_at_one() {
        let stats = SourceStats::replay(&[
            entry(HookEvent::Invoke, None, None),
            entry(HookEvent::Output, Some(5), Some(false)),
            entry(HookEvent::Error, Some(5), None),
        ]);
        let view = stats.snapshot("s");
        assert_eq!(view.errors, 2);
        assert_eq!(view.error_rate, 1.0);
    }

    #[test]
    fn test_sequence_continues_from_replayed_lines() {
        let mut sequenced = entry(HookEvent::Invoke, None, None);
        sequenced.seq = Some(41);
        let stats = SourceStats::replay(&[entry(HookEvent::Invoke, None, None), sequenced]);
        assert_eq!(stats.next_sequence(), 42);

        let unsequenced = SourceStats::replay(&[
            entry(HookEvent::Invoke, None, None),
            entry(HookEvent::Output, Some(1), Some(true)),
        ]);
        assert_eq!(unsequenced.next_sequence(), 3);
        assert_eq!(SourceStats::default().next_sequence(), 1);
    }

    #[test]
    fn test_cache_replays_once() {
        let cache = StatsCache::new();
        assert!(!cache.is_warm("s"));
        assert!(!cache.apply_if_warm("s", &entry(HookEvent::Invoke, None, None)));

        let mut replays = 0;
        let view = cache.get_or_replay("s", || {
            replays += 1;
            SourceStats::replay(&[entry(HookEvent::Invoke, None, None)])
        });
        assert_eq!(view.calls, 1);
        assert!(cache.is_warm("s"));

        assert!(cache.apply_if_warm("s", &entry(HookEvent::Invoke, None, None)));
        let view = cache.get_or_replay("s", || {
            replays += 1;
            SourceStats::default()
        });
        assert_eq!(view.calls, 2);
        assert_eq!(replays, 1);

        cache.invalidate("s");
        assert!(!cache.is_warm("s"));
    }
}
