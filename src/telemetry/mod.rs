//! Telemetry encoding and export.
//!
//! - [`line_protocol`]: pure encoder for the remote wire format
//! - [`exporter`]: deadline-bounded socket writes and HTTP queries
//! - [`recorder`]: dual-write of metrics (local store first, remote mirror second)

pub mod exporter;
pub mod line_protocol;
pub mod recorder;

pub use exporter::{spawn_detached, ExportRow, PointSink, RemoteExporter};
pub use line_protocol::{build_line, FieldValue, Fields, Point};
pub use recorder::{metric_point, remote_sink, RecordOutcome, Recorder, METRICS_TABLE};
