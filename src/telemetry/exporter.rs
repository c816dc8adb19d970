//! Best-effort export to a remote time-series store.
//!
//! Writes go over a raw TCP socket in line protocol; the HTTP endpoint is
//! only used for read queries such as health checks. Every network call is
//! wrapped in a hard deadline and reports a plain outcome (`bool`, count,
//! `Option`), so an unreachable or stalled endpoint costs the caller at most
//! the configured timeout and never an error.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::line_protocol::{Fields, Point};
use crate::config::RemoteConfig;
use crate::error::{ExportError, ExportResult};
use crate::store::Tags;

/// Destination for encoded points.
///
/// Implementations must never block past their own deadline and must never
/// fail the caller: outcomes are reported, not raised.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Send one point. Returns whether the write was confirmed.
    async fn export_point(&self, point: Point) -> bool;

    /// Send many points over one connection. Returns how many were written.
    async fn export_points(&self, points: Vec<Point>) -> usize;
}

/// One row of a batch export.
#[derive(Debug, Clone, Default)]
pub struct ExportRow {
    pub tags: Tags,
    pub fields: Fields,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Line-protocol exporter with an HTTP query side channel.
#[derive(Clone)]
pub struct RemoteExporter {
    client: Client,
    host: String,
    ilp_port: u16,
    http_port: u16,
    line_timeout: Duration,
    batch_timeout: Duration,
    query_timeout: Duration,
}

impl RemoteExporter {
    /// Create an exporter for the configured endpoint. No connection is opened.
    pub fn new(config: &RemoteConfig) -> ExportResult<Self> {
        let client = Client::builder()
            .timeout(config.query_timeout())
            .build()
            .map_err(ExportError::Http)?;

        Ok(Self {
            client,
            host: config.host.clone(),
            ilp_port: config.ilp_port,
            http_port: config.http_port,
            line_timeout: config.line_timeout(),
            batch_timeout: config.batch_timeout(),
            query_timeout: config.query_timeout(),
        })
    }

    /// `host:port` of the line-protocol socket.
    pub fn ilp_addr(&self) -> String {
        format!("{}:{}", self.host, self.ilp_port)
    }

    /// Base URL of the HTTP query endpoint.
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    /// Export a single point to `table`, stamped now.
    pub async fn export_line(&self, table: &str, values: Fields, tags: Tags) -> bool {
        let point = Point {
            table: table.to_string(),
            tags,
            fields: values,
            timestamp_nanos: None,
        }
        .at(Utc::now());
        self.export_point(point).await
    }

    /// Export many rows to `table` in one write. Returns the number written.
    pub async fn export_batch(&self, table: &str, rows: Vec<ExportRow>) -> usize {
        let now = Utc::now();
        let points = rows
            .into_iter()
            .map(|row| {
                Point {
                    table: table.to_string(),
                    tags: row.tags,
                    fields: row.fields,
                    timestamp_nanos: None,
                }
                .at(row.timestamp.unwrap_or(now))
            })
            .collect();
        self.export_points(points).await
    }

    /// Run a read query against the HTTP endpoint.
    ///
    /// Returns `None` on any failure, including the deadline elapsing.
    pub async fn query_remote(&self, sql: &str, timeout: Duration) -> Option<Value> {
        match self.try_query(sql, timeout).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Remote query failed");
                None
            }
        }
    }

    /// Whether the remote endpoint answers a trivial query in time.
    pub async fn health_check(&self) -> bool {
        self.query_remote("SELECT 1", self.query_timeout)
            .await
            .is_some()
    }

    async fn try_query(&self, sql: &str, timeout: Duration) -> ExportResult<Value> {
        let url = Url::parse_with_params(&format!("{}/exec", self.http_base()), &[("query", sql)])
            .map_err(|e| ExportError::InvalidResponse {
                message: format!("Invalid query URL: {}", e),
            })?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    ExportError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::InvalidResponse {
                message: format!("Query returned status {}", status.as_u16()),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ExportError::InvalidResponse {
                message: format!("Failed to parse query response: {}", e),
            })
    }

    /// Open a connection, write `payload`, and close, all within `deadline`.
    ///
    /// On timeout the in-flight future is dropped, which closes the socket.
    async fn send(&self, payload: &[u8], deadline: Duration) -> ExportResult<()> {
        let addr = self.ilp_addr();
        let write = async {
            let mut stream =
                TcpStream::connect(&addr)
                    .await
                    .map_err(|source| ExportError::Connect {
                        addr: addr.clone(),
                        source,
                    })?;
            stream.write_all(payload).await.map_err(ExportError::Write)?;
            stream.flush().await.map_err(ExportError::Write)?;
            stream.shutdown().await.map_err(ExportError::Write)?;
            Ok::<(), ExportError>(())
        };

        match tokio::time::timeout(deadline, write).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl PointSink for RemoteExporter {
    async fn export_point(&self, point: Point) -> bool {
        if !point.has_fields() {
            let err = ExportError::EmptyPoint { table: point.table };
            debug!(error = %err, "Export skipped");
            return false;
        }

        let start = Instant::now();
        match self.send(point.to_line().as_bytes(), self.line_timeout).await {
            Ok(()) => {
                trace!(
                    table = %point.table,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Exported point"
                );
                true
            }
            Err(e) => {
                debug!(
                    table = %point.table,
                    addr = %self.ilp_addr(),
                    error = %e,
                    "Remote export failed"
                );
                false
            }
        }
    }

    async fn export_points(&self, points: Vec<Point>) -> usize {
        let mut payload = String::new();
        let mut count = 0;
        for point in points.iter().filter(|p| p.has_fields()) {
            payload.push_str(&point.to_line());
            count += 1;
        }
        if count == 0 {
            return 0;
        }

        match self.send(payload.as_bytes(), self.batch_timeout).await {
            Ok(()) => count,
            Err(e) => {
                debug!(
                    rows = count,
                    addr = %self.ilp_addr(),
                    error = %e,
                    "Remote batch export failed"
                );
                0
            }
        }
    }
}

/// Run `future` on the current runtime without awaiting it.
///
/// Returns `None` when called outside a Tokio runtime, in which case the
/// export is simply skipped.
pub fn spawn_detached<F>(future: F) -> Option<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            debug!("No async runtime available; skipping remote export");
            None
        }
    }
}
