//! Command-line surface for hook scripts.
//!
//! Every command prints one JSON document on stdout and exits 0, including
//! when telemetry could not be written: a hook must never fail because of its
//! own instrumentation. Payload arguments that are omitted are read from
//! stdin when stdin is piped.

use std::io::{IsTerminal, Read};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Config;
use crate::debug_log::DebugLog;
use crate::insights::{
    end_session, record_tip_outcome, SessionTipStore, TipGenerator, TipOutcome,
};
use crate::store::{ContextStats, SessionCounters, SessionState, Tags};
use crate::telemetry::{Recorder, RemoteExporter};

/// Top-level argument parser.
#[derive(Parser, Debug)]
#[command(
    name = "hook-insights",
    version,
    about = "Local-first hook telemetry and session tips"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Record one metric locally and mirror it remotely
    Metric {
        /// Metric name
        name: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
        /// Tags in key=value form (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Session snapshot commands
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Context snapshot commands
    Context {
        #[command(subcommand)]
        action: ContextCommands,
    },

    /// Show pending tips for this session
    Tips {
        /// Leave the tips pending instead of consuming them
        #[arg(long)]
        keep: bool,
    },

    /// Record whether acting on a tip helped
    Outcome {
        /// Rule that produced the tip
        #[arg(long)]
        rule: String,
        /// Command that was run
        #[arg(long)]
        command: String,
        /// The command resolved the problem
        #[arg(long)]
        success: bool,
    },

    /// Hook debug log commands
    Log {
        #[command(subcommand)]
        action: LogCommands,
    },

    /// Show aggregated hook stats
    Stats {
        /// Limit to one source
        source: Option<String>,
    },

    /// Check that the remote endpoint answers
    Health,
}

/// Session snapshot subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Replace the current session snapshot
    Save {
        /// Counters as a JSON object (read from stdin when omitted)
        counters: Option<String>,
        /// Session identifier
        #[arg(long)]
        session: Option<String>,
        /// Project name
        #[arg(long)]
        project: Option<String>,
    },
    /// Generate tips for the next session and archive this one
    End {
        /// Recently failed commands (repeatable)
        #[arg(long = "failed")]
        failed: Vec<String>,
    },
}

/// Context snapshot subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum ContextCommands {
    /// Replace the current context snapshot
    Save {
        /// Numeric fields as a JSON object (read from stdin when omitted)
        fields: Option<String>,
    },
}

/// Debug log subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum LogCommands {
    /// Record an invocation
    Invoke {
        source: String,
        /// Input payload (read from stdin when omitted)
        input: Option<String>,
    },
    /// Record an invocation's output
    Output {
        source: String,
        /// Output payload (read from stdin when omitted)
        output: Option<String>,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
        /// Mark the invocation as failed
        #[arg(long)]
        failed: bool,
        #[arg(long)]
        error_type: Option<String>,
    },
    /// Record a failed invocation
    Error {
        source: String,
        message: String,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (always 0; failures are reported in the output)
    pub exit_code: i32,
    /// JSON document for stdout
    pub output: Value,
}

impl CliResult {
    /// Successful result carrying `output`.
    pub fn success(output: Value) -> Self {
        Self {
            exit_code: 0,
            output,
        }
    }

    /// Degraded result; the command did nothing useful but the hook goes on.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: json!({ "ok": false, "error": message.into() }),
        }
    }
}

/// Long-lived handles shared by every command.
pub struct CliContext {
    pub config: Config,
    pub recorder: Recorder,
    pub debug_log: DebugLog,
}

impl CliContext {
    /// Wire up the recorder and debug log for `config`.
    pub fn new(config: Config) -> Self {
        let recorder = Recorder::from_config(&config);
        let debug_log = DebugLog::from_config(&config);
        Self {
            config,
            recorder,
            debug_log,
        }
    }

    /// Wait for exports started by the debug log.
    pub async fn flush(&self) -> usize {
        self.debug_log.flush().await
    }
}

/// Execute one command.
pub async fn execute_command(command: Commands, ctx: &CliContext) -> CliResult {
    match command {
        Commands::Metric { name, value, tags } => {
            execute_metric(ctx, &name, parse_value(&value), parse_tags(&tags)).await
        }
        Commands::Session { action } => match action {
            SessionCommands::Save {
                counters,
                session,
                project,
            } => execute_session_save(ctx, counters, session, project),
            SessionCommands::End { failed } => execute_session_end(ctx, &failed).await,
        },
        Commands::Context {
            action: ContextCommands::Save { fields },
        } => execute_context_save(ctx, fields),
        Commands::Tips { keep } => execute_tips(ctx, keep),
        Commands::Outcome {
            rule,
            command,
            success,
        } => {
            let outcome = TipOutcome {
                rule,
                command,
                success,
            };
            let recorded = record_tip_outcome(&ctx.recorder, &outcome);
            let saved = recorded.saved;
            CliResult::success(json!({ "saved": saved, "exported": recorded.exported().await }))
        }
        Commands::Log { action } => execute_log(ctx, action),
        Commands::Stats { source } => execute_stats(ctx, source),
        Commands::Health => execute_health(ctx).await,
    }
}

async fn execute_metric(ctx: &CliContext, name: &str, value: Value, tags: Tags) -> CliResult {
    let outcome = ctx.recorder.record(name, value, tags);
    let saved = outcome.saved;
    let exported = outcome.exported().await;
    CliResult::success(json!({ "saved": saved, "exported": exported }))
}

fn execute_session_save(
    ctx: &CliContext,
    counters: Option<String>,
    session: Option<String>,
    project: Option<String>,
) -> CliResult {
    let raw = match payload_or_stdin(counters) {
        Some(raw) => raw,
        None => return CliResult::degraded("no session counters given"),
    };
    let counters: SessionCounters = match serde_json::from_str(&raw) {
        Ok(c) => c,
        Err(e) => return CliResult::degraded(format!("invalid session counters: {}", e)),
    };

    let mut state = SessionState::new(counters);
    state.session_id = session;
    state.project = project;
    let saved = ctx.recorder.store().save_session_state(&state);
    CliResult::success(json!({ "saved": saved }))
}

async fn execute_session_end(ctx: &CliContext, failed: &[String]) -> CliResult {
    let generator = TipGenerator::with_max_tips(ctx.recorder.settings().max_tips);
    let Some(ended) = end_session(&ctx.recorder, &generator, failed) else {
        return CliResult::degraded("no session state saved");
    };

    let archived = ended.archive.saved;
    let exported = ended.archive.exported().await;
    CliResult::success(json!({
        "sessionId": ended.session_id,
        "project": ended.project,
        "tips": ended.tips,
        "tipsSaved": ended.tips_saved,
        "archived": archived,
        "exported": exported,
    }))
}

fn execute_context_save(ctx: &CliContext, fields: Option<String>) -> CliResult {
    let raw = match payload_or_stdin(fields) {
        Some(raw) => raw,
        None => return CliResult::degraded("no context fields given"),
    };
    match serde_json::from_str(&raw) {
        Ok(fields) => {
            let saved = ctx
                .recorder
                .store()
                .save_context_stats(&ContextStats::new(fields));
            CliResult::success(json!({ "saved": saved }))
        }
        Err(e) => CliResult::degraded(format!("invalid context fields: {}", e)),
    }
}

fn execute_tips(ctx: &CliContext, keep: bool) -> CliResult {
    let store = SessionTipStore::new(&ctx.config.storage.base_dir);
    let pending = if keep { store.load() } else { store.take() };
    match pending {
        Some(pending) => CliResult::success(json!(pending)),
        None => CliResult::success(json!({ "tips": [] })),
    }
}

fn execute_log(ctx: &CliContext, action: LogCommands) -> CliResult {
    let log = &ctx.debug_log;
    match action {
        LogCommands::Invoke { source, input } => {
            let input = payload_or_stdin(input).map(|raw| parse_value(&raw));
            log.log_invocation(&source, &input.unwrap_or(Value::Null));
        }
        LogCommands::Output {
            source,
            output,
            duration_ms,
            failed,
            error_type,
        } => {
            let output = payload_or_stdin(output).map(|raw| parse_value(&raw));
            log.log_output(
                &source,
                &output.unwrap_or(Value::Null),
                duration_ms,
                !failed,
                error_type.as_deref(),
            );
        }
        LogCommands::Error {
            source,
            message,
            duration_ms,
        } => log.log_error(&source, &message, duration_ms),
    }
    CliResult::success(json!({ "ok": true }))
}

fn execute_stats(ctx: &CliContext, source: Option<String>) -> CliResult {
    match source {
        Some(source) => CliResult::success(json!(ctx.debug_log.get_stats(&source))),
        None => CliResult::success(json!(ctx.debug_log.get_all_stats())),
    }
}

async fn execute_health(ctx: &CliContext) -> CliResult {
    let remote = &ctx.config.remote;
    let healthy = match RemoteExporter::new(remote) {
        Ok(exporter) => exporter.health_check().await,
        Err(e) => {
            warn!(error = %e, "Could not build remote client");
            false
        }
    };
    CliResult::success(json!({
        "remote": healthy,
        "host": remote.host,
        "ilpPort": remote.ilp_port,
        "httpPort": remote.http_port,
    }))
}

/// Parse `raw` as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse `key=value` pairs, skipping malformed ones.
pub fn parse_tags(raw: &[String]) -> Tags {
    raw.iter()
        .filter_map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Some((key.to_string(), value.to_string())),
            _ => {
                warn!(tag = %pair, "Ignoring malformed tag");
                None
            }
        })
        .collect()
}

fn payload_or_stdin(arg: Option<String>) -> Option<String> {
    if arg.is_some() {
        return arg;
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut buf = String::new();
    match stdin.lock().read_to_string(&mut buf) {
        Ok(_) if !buf.trim().is_empty() => Some(buf),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Failed to read stdin");
            None
        }
    }
}
