//! # Hook Insights
//!
//! Local-first telemetry and self-tuning session tips for developer-tool
//! lifecycle hooks.
//!
//! ## Features
//!
//! - **Local Store**: append-only JSONL metrics plus session and context snapshots
//! - **Line Protocol**: pure encoder for the remote time-series wire format
//! - **Remote Export**: deadline-bounded, fire-and-forget socket writes
//! - **Debug Logs**: per-source rotating logs with cached p95 stats
//! - **Tips**: z-score anomaly rules, command ranking and bounded confidence
//!
//! ## Architecture
//!
//! ```text
//! hook process → Recorder ─┬→ LocalStore (JSONL, source of truth)
//!                          └→ RemoteExporter (ILP over TCP, best effort)
//!              → DebugLog  ─→ StatsCache (in memory, rebuilt from log)
//!              → TipGenerator → SessionTipStore → next session
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use hook_insights::{Config, Recorder};
//! use hook_insights::insights::{generate_tips, HistoricalStats};
//!
//! let config = Config::from_env()?;
//! let recorder = Recorder::from_config(&config);
//! recorder.record("tool_calls", serde_json::json!(12), Default::default());
//!
//! let state = recorder.store().load_session_state();
//! let historical = HistoricalStats::from_store(recorder.store());
//! let tips = generate_tips(&state.unwrap().counters, &historical);
//! ```

/// Command-line surface used by the binary.
pub mod cli;
/// Configuration from the environment and the settings file.
pub mod config;
/// Per-source rotating debug logs and aggregated stats.
pub mod debug_log;
/// Error types and result aliases.
pub mod error;
/// Statistical tip engine.
pub mod insights;
/// Local JSONL persistence.
pub mod store;
/// Line-protocol encoding and remote export.
pub mod telemetry;

pub use config::{Config, Settings};
pub use debug_log::{DebugLog, HookStats};
pub use error::{AppError, AppResult};
pub use insights::{Tip, TipGenerator};
pub use store::LocalStore;
pub use telemetry::{Recorder, RemoteExporter};
