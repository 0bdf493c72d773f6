//! Session configuration
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! `TETHER__*` environment variables (`TETHER__CLIENT__BASE_URL`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tether_http::ClientConfig;

use crate::error::SessionResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Remaining lifetime at which a silent refresh starts
    pub expiring_threshold_secs: i64,
    /// Countdown granularity
    pub tick_ms: u64,
    /// Session registry polling interval
    pub poll_interval_secs: u64,
    /// Directory of the persistent store; platform data dir when unset
    pub state_dir: Option<PathBuf>,
    pub client: ClientConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiring_threshold_secs: 30,
            tick_ms: 1000,
            poll_interval_secs: 30,
            state_dir: None,
            client: ClientConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration, reading `path` if given
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let mut builder = Config::builder();

        // Start with defaults
        builder = builder.add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        // Environment variables override file settings
        builder = builder.add_source(
            Environment::with_prefix("TETHER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        tracing::debug!(base_url = %config.client.base_url, "configuration loaded");
        Ok(config)
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Where the persistent store lives
    #[cfg(not(target_arch = "wasm32"))]
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "tether", "tether").map_or_else(
                || PathBuf::from(".tether"),
                |dirs| dirs.data_dir().to_path_buf(),
            )
        })
    }
}
