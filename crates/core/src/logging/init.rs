//! Initialization functions for tracing

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::InstrumentationConfig;
use crate::{CoreError, CoreResult};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber is already installed or the log file cannot be opened.
pub fn init_tracing(config: &InstrumentationConfig) -> CoreResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(log_file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(env_filter)
        .try_init()
        .map_err(|e| CoreError::internal_error(format!("failed to install subscriber: {e}")))?;

    tracing::debug!(service = %config.service_name, "tracing initialized");
    Ok(())
}

/// Initialize with default configuration from environment
pub fn init_default() -> CoreResult<()> {
    init_tracing(&InstrumentationConfig::from_env())
}
