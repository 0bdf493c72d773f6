//! Tether CLI - command-line client for a token-based auth service

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tether_core::logging::{InstrumentationConfig, init_tracing};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Sign in, keep the session alive and manage device sessions")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(short = 'c', long, global = true, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the auth service
    #[arg(short = 'u', long, global = true, env = "TETHER_BASE_URL")]
    base_url: Option<String>,

    /// Directory holding the session store
    #[arg(short = 'd', long, global = true)]
    state_dir: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "0")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let instrumentation = InstrumentationConfig::from_env().with_level(cli.log_level.as_str());
    init_tracing(&InstrumentationConfig {
        json: cli.json_logs || instrumentation.json,
        ..instrumentation
    })?;

    let overrides = config::Overrides {
        base_url: cli.base_url,
        state_dir: cli.state_dir,
    };
    let settings = config::load(cli.config.as_deref(), overrides)?;
    info!(base_url = %settings.client.base_url, "starting tether");

    let run = cli.command.execute(settings);
    let outcome = if cli.timeout == 0 {
        run.await
    } else {
        let limit = Duration::from_secs(cli.timeout);
        match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = outcome {
        error!("Command failed: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}
