use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hook_insights::{
    cli::{execute_command, Cli, CliContext, CliResult},
    config::{Config, LogFormat},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            // Hooks must keep running; report and exit cleanly.
            eprintln!("Configuration error: {}", e);
            println!("{}", CliResult::degraded(e.to_string()).output);
            return Ok(());
        }
    };

    init_logging(&config);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        base_dir = %config.storage.base_dir.display(),
        "hook-insights starting"
    );

    let ctx = CliContext::new(config);
    let result = execute_command(cli.command, &ctx).await;

    let confirmed = ctx.flush().await;
    debug!(confirmed, "Pending exports settled");

    match serde_json::to_string(&result.output) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "Failed to serialize output"),
    }

    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing on stderr; stdout carries hook output.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
