//! Integration tests for the remote exporter
//!
//! The line-protocol side is exercised against raw `TcpListener`s; the HTTP
//! query side uses wiremock.

use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use hook_insights::config::RemoteConfig;
use hook_insights::store::Tags;
use hook_insights::telemetry::{ExportRow, FieldValue, Fields, Point, PointSink, RemoteExporter};

/// Create an exporter for a local endpoint with short deadlines.
fn create_test_exporter(ilp_port: u16, http_port: u16, timeout_ms: u64) -> RemoteExporter {
    let config = RemoteConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        ilp_port,
        http_port,
        line_timeout_ms: timeout_ms,
        batch_timeout_ms: timeout_ms * 2,
        query_timeout_ms: timeout_ms,
    };
    RemoteExporter::new(&config).expect("Failed to create exporter")
}

async fn read_all(listener: TcpListener) -> String {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = String::new();
    stream.read_to_string(&mut buf).await.unwrap();
    buf
}

#[cfg(test)]
mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_export_line_delivers_encoded_point() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(read_all(listener));

        let exporter = create_test_exporter(port, 1, 1000);
        let mut fields = Fields::new();
        fields.insert("value".to_string(), FieldValue::from(1i64));
        let mut tags = Tags::new();
        tags.insert("project".to_string(), "demo".to_string());

        assert!(exporter.export_line("hook_metrics", fields, tags).await);

        let received = reader.await.unwrap();
        assert!(received.starts_with("hook_metrics,project=demo value=1i "));
        assert!(received.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_export_batch_counts_rows() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(read_all(listener));

        let exporter = create_test_exporter(port, 1, 1000);
        let rows = (0..3)
            .map(|i| {
                let mut fields = Fields::new();
                fields.insert("n".to_string(), FieldValue::from(i as i64));
                ExportRow {
                    fields,
                    ..Default::default()
                }
            })
            .chain(std::iter::once(ExportRow::default()))
            .collect();

        assert_eq!(exporter.export_batch("hook_events", rows).await, 3);
        assert_eq!(reader.await.unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_refused_connection_fails_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let exporter = create_test_exporter(port, 1, 3000);
        let start = Instant::now();
        let ok = exporter
            .export_point(Point::new("t").field("v", 1i64))
            .await;
        assert!(!ok);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_stalled_endpoint_bounded_by_timeout() {
        // Never accepted, never read: the write blocks once buffers fill.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let exporter = create_test_exporter(port, 1, 250);
        let blob = "x".repeat(1024 * 1024);
        let points: Vec<Point> = (0..64)
            .map(|i| Point::new("bulk").field("blob", blob.as_str()).field("i", i as i64))
            .collect();

        let start = Instant::now();
        let written = exporter.export_points(points).await;
        let elapsed = start.elapsed();

        assert_eq!(written, 0);
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
        drop(listener);
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_ok() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exec"))
            .and(query_param("query", "SELECT 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "SELECT 1",
                "columns": [{"name": "1", "type": "INT"}],
                "dataset": [[1]],
                "count": 1
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let exporter = create_test_exporter(1, mock_server.address().port(), 1000);
        assert!(exporter.health_check().await);
    }

    #[tokio::test]
    async fn test_query_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exec"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 7})))
            .mount(&mock_server)
            .await;

        let exporter = create_test_exporter(1, mock_server.address().port(), 1000);
        let result = exporter
            .query_remote("SELECT count() FROM hook_events", Duration::from_secs(1))
            .await;
        assert_eq!(result, Some(json!({"count": 7})));
    }

    #[tokio::test]
    async fn test_query_error_status_is_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exec"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let exporter = create_test_exporter(1, mock_server.address().port(), 1000);
        assert!(!exporter.health_check().await);
    }

    #[tokio::test]
    async fn test_slow_query_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exec"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let exporter = create_test_exporter(1, mock_server.address().port(), 1000);
        let start = Instant::now();
        let result = exporter
            .query_remote("SELECT 1", Duration::from_millis(200))
            .await;
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
