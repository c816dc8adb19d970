//! Dual-write recording: durable local append plus a mirrored remote export.
//!
//! The local write happens synchronously and decides the outcome. The remote
//! copy is spawned on the runtime and can be awaited for confirmation, but
//! nothing depends on it.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

use super::exporter::{spawn_detached, PointSink, RemoteExporter};
use super::line_protocol::{FieldValue, Point};
use crate::config::{Config, Settings};
use crate::store::{LocalStore, MetricEntry, Tags};

/// Table that raw metrics are mirrored to.
pub const METRICS_TABLE: &str = "hook_metrics";

/// Outcome of [`Recorder::record`].
#[derive(Debug)]
pub struct RecordOutcome {
    /// Whether the fact reached the local store.
    pub saved: bool,
    /// In-flight remote export, if one was started.
    pub export: Option<JoinHandle<bool>>,
}

impl RecordOutcome {
    /// Wait for the remote copy, if any. Bounded by the exporter deadline.
    pub async fn exported(self) -> bool {
        match self.export {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        }
    }
}

/// Records metrics locally and mirrors them to a [`PointSink`].
#[derive(Clone)]
pub struct Recorder {
    store: LocalStore,
    sink: Option<Arc<dyn PointSink>>,
    settings: Settings,
}

impl Recorder {
    /// Create a recorder from explicit parts.
    pub fn new(store: LocalStore, sink: Option<Arc<dyn PointSink>>, settings: Settings) -> Self {
        Self {
            store,
            sink,
            settings,
        }
    }

    /// Build a recorder from configuration, wiring the remote exporter when
    /// both the environment and the settings file allow it.
    pub fn from_config(config: &Config) -> Self {
        let settings = config.settings();
        let store = LocalStore::new(&config.storage.base_dir);
        Self::new(store, remote_sink(config, &settings), settings)
    }

    /// The underlying local store.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The remote sink, if export is enabled.
    pub fn sink(&self) -> Option<Arc<dyn PointSink>> {
        self.sink.clone()
    }

    /// Settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Save one metric locally and start a best-effort remote copy.
    pub fn record(&self, name: &str, value: Value, tags: Tags) -> RecordOutcome {
        if !self.settings.enabled {
            return RecordOutcome {
                saved: false,
                export: None,
            };
        }

        let entry = MetricEntry::new(name, value, tags);
        let saved = self.store.append_metric(&entry);

        let export = self.sink.clone().and_then(|sink| {
            let point = metric_point(&entry);
            spawn_detached(async move { sink.export_point(point).await })
        });

        RecordOutcome { saved, export }
    }
}

/// Build the remote sink for `config`, or `None` when export is disabled.
pub fn remote_sink(config: &Config, settings: &Settings) -> Option<Arc<dyn PointSink>> {
    if !(config.remote.enabled && settings.remote_export && settings.enabled) {
        return None;
    }
    match RemoteExporter::new(&config.remote) {
        Ok(exporter) => Some(Arc::new(exporter)),
        Err(e) => {
            warn!(error = %e, "Remote exporter unavailable; continuing local-only");
            None
        }
    }
}

/// Convert a metric entry to a point on [`METRICS_TABLE`].
///
/// Object values are flattened into dotted field names; any other value is
/// carried in a single `value` field.
pub fn metric_point(entry: &MetricEntry) -> Point {
    let mut point = Point::new(METRICS_TABLE).at(entry.timestamp);
    point.tags = entry.tags.clone();
    point.tags.insert("metric".to_string(), entry.name.clone());

    match &entry.value {
        Value::Object(_) => flatten_fields(&mut point, "", &entry.value),
        other => {
            point.fields.insert("value".to_string(), FieldValue::from(other));
        }
    }
    point
}

fn flatten_fields(point: &mut Point, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_fields(point, &name, child);
            }
        }
        leaf => {
            point
                .fields
                .insert(prefix.to_string(), FieldValue::from(leaf));
        }
    }
}
