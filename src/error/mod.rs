use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Local storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

/// Remote export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("Export timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Point for table {table} has no fields")]
    EmptyPoint { table: String },
}

/// Errors raised while evaluating a pattern rule
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Missing counter: {name}")]
    MissingCounter { name: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidCounter { name: String, value: f64 },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type alias for rule evaluation
pub type RuleResult<T> = Result<T, RuleError>;
