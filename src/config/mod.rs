use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

/// Name of the settings file inside the base directory.
pub const SETTINGS_FILE: &str = "config.json";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Local storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
}

/// Remote time-series store configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub host: String,
    pub ilp_port: u16,
    pub http_port: u16,
    pub line_timeout_ms: u64,
    pub batch_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_dir = match env::var("HOOK_INSIGHTS_DIR") {
            Ok(dir) if dir.trim().is_empty() => {
                return Err(AppError::Config {
                    message: "HOOK_INSIGHTS_DIR is set but empty".to_string(),
                })
            }
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_base_dir(),
        };

        let remote = RemoteConfig {
            enabled: env::var("TELEMETRY_REMOTE_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
            host: env::var("TELEMETRY_HOST").unwrap_or_else(|_| "localhost".to_string()),
            ilp_port: parse_env("TELEMETRY_ILP_PORT", 9009),
            http_port: parse_env("TELEMETRY_HTTP_PORT", 9000),
            line_timeout_ms: parse_env("TELEMETRY_TIMEOUT_MS", 3000),
            batch_timeout_ms: parse_env("TELEMETRY_BATCH_TIMEOUT_MS", 6000),
            query_timeout_ms: parse_env("TELEMETRY_QUERY_TIMEOUT_MS", 2000),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            storage: StorageConfig { base_dir },
            remote,
            logging,
        })
    }

    /// Configuration rooted at `base_dir` with all other values defaulted.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                base_dir: base_dir.into(),
            },
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load the settings file from the configured base directory.
    pub fn settings(&self) -> Settings {
        Settings::load(&self.storage.base_dir)
    }
}

impl RemoteConfig {
    /// Deadline for a single-line send.
    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }

    /// Deadline for a batch send.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Deadline for an HTTP query.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            ilp_port: 9009,
            http_port: 9000,
            line_timeout_ms: 3000,
            batch_timeout_ms: 6000,
            query_timeout_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Overrides read from `<base_dir>/config.json`.
///
/// Every field is optional on disk; a missing or unreadable file yields
/// [`Settings::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Record telemetry locally at all.
    pub enabled: bool,
    /// Mirror recorded facts to the remote store.
    pub remote_export: bool,
    /// Rotation cap for each debug log.
    pub max_log_entries: usize,
    /// Export aggregated hook stats every N debug-log calls.
    pub stats_export_interval: u64,
    /// Byte budget for a logged payload before truncation.
    pub max_payload_bytes: usize,
    /// Upper bound on tips kept per session.
    pub max_tips: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_export: true,
            max_log_entries: 1000,
            stats_export_interval: 10,
            max_payload_bytes: 2000,
            max_tips: 5,
        }
    }
}

impl Settings {
    /// Read settings from `base_dir`, falling back to defaults.
    pub fn load(base_dir: &Path) -> Self {
        let path = base_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring malformed settings file");
                Self::default()
            }
        }
    }
}

fn default_base_dir() -> PathBuf {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join(".hook-insights"),
        _ => PathBuf::from(".hook-insights"),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert!(settings.remote_export);
        assert_eq!(settings.max_log_entries, 1000);
        assert_eq!(settings.stats_export_interval, 10);
        assert_eq!(settings.max_tips, 5);
    }

    #[test]
    fn test_settings_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(dir.path()), Settings::default());
    }

    #[test]
    fn test_settings_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"maxLogEntries": 50, "remoteExport": false}"#,
        )
        .unwrap();

        let settings = Settings::load(dir.path());
        assert_eq!(settings.max_log_entries, 50);
        assert!(!settings.remote_export);
        assert_eq!(settings.stats_export_interval, 10);
    }

    #[test]
    fn test_settings_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        assert_eq!(Settings::load(dir.path()), Settings::default());
    }

    #[test]
    fn test_remote_timeouts() {
        let remote = RemoteConfig::default();
        assert_eq!(remote.line_timeout(), Duration::from_secs(3));
        assert_eq!(remote.batch_timeout(), Duration::from_secs(6));
        assert!(remote.query_timeout() < remote.line_timeout());
    }
}
