//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env file
//! via dotenvy, so each test sets the variables it asserts on explicitly.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use std::env;
use std::path::PathBuf;

use serial_test::serial;

use hook_insights::config::{Config, LogFormat, Settings};

const VARS: &[&str] = &[
    "HOOK_INSIGHTS_DIR",
    "TELEMETRY_HOST",
    "TELEMETRY_ILP_PORT",
    "TELEMETRY_HTTP_PORT",
    "TELEMETRY_REMOTE_ENABLED",
    "TELEMETRY_TIMEOUT_MS",
    "TELEMETRY_BATCH_TIMEOUT_MS",
    "TELEMETRY_QUERY_TIMEOUT_MS",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

fn clear_vars() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    clear_vars();
    env::set_var("HOOK_INSIGHTS_DIR", "/tmp/hook-insights-test");

    let config = Config::from_env().unwrap();
    assert_eq!(config.storage.base_dir, PathBuf::from("/tmp/hook-insights-test"));
    assert!(config.remote.enabled);
    assert_eq!(config.remote.host, "localhost");
    assert_eq!(config.remote.ilp_port, 9009);
    assert_eq!(config.remote.http_port, 9000);
    assert_eq!(config.remote.line_timeout_ms, 3000);
    assert_eq!(config.remote.batch_timeout_ms, 6000);
    assert_eq!(config.remote.query_timeout_ms, 2000);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Pretty);

    clear_vars();
}

#[test]
#[serial]
fn test_config_remote_overrides() {
    clear_vars();
    env::set_var("TELEMETRY_HOST", "tsdb.internal");
    env::set_var("TELEMETRY_ILP_PORT", "19009");
    env::set_var("TELEMETRY_HTTP_PORT", "19000");
    env::set_var("TELEMETRY_TIMEOUT_MS", "500");

    let config = Config::from_env().unwrap();
    assert_eq!(config.remote.host, "tsdb.internal");
    assert_eq!(config.remote.ilp_port, 19009);
    assert_eq!(config.remote.http_port, 19000);
    assert_eq!(config.remote.line_timeout().as_millis(), 500);

    clear_vars();
}

#[test]
#[serial]
fn test_config_invalid_numbers_fall_back() {
    clear_vars();
    env::set_var("TELEMETRY_ILP_PORT", "not-a-port");
    env::set_var("TELEMETRY_QUERY_TIMEOUT_MS", "-5");

    let config = Config::from_env().unwrap();
    assert_eq!(config.remote.ilp_port, 9009);
    assert_eq!(config.remote.query_timeout_ms, 2000);

    clear_vars();
}

#[test]
#[serial]
fn test_config_remote_disabled() {
    clear_vars();
    for value in ["false", "FALSE", "0"] {
        env::set_var("TELEMETRY_REMOTE_ENABLED", value);
        assert!(!Config::from_env().unwrap().remote.enabled, "{value}");
    }
    env::set_var("TELEMETRY_REMOTE_ENABLED", "yes");
    assert!(Config::from_env().unwrap().remote.enabled);

    clear_vars();
}

#[test]
#[serial]
fn test_config_json_logging() {
    clear_vars();
    env::set_var("LOG_FORMAT", "JSON");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, "debug");

    clear_vars();
}

#[test]
#[serial]
fn test_config_empty_base_dir_is_rejected() {
    clear_vars();
    env::set_var("HOOK_INSIGHTS_DIR", "  ");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("HOOK_INSIGHTS_DIR"));

    clear_vars();
}

#[test]
#[serial]
fn test_settings_file_is_read_from_base_dir() {
    clear_vars();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"remoteExport": false, "maxLogEntries": 50}"#,
    )
    .unwrap();
    env::set_var("HOOK_INSIGHTS_DIR", dir.path());

    let settings = Config::from_env().unwrap().settings();
    assert_eq!(
        settings,
        Settings {
            remote_export: false,
            max_log_entries: 50,
            ..Settings::default()
        }
    );

    clear_vars();
}
