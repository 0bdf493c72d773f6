//! Configuration for log output

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main instrumentation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Service name attached to every event
    pub service_name: String,
    /// Log level filter (e.g., "info", "debug", "tether_http=trace")
    pub log_level: String,
    /// Emit one JSON object per event instead of human-readable lines
    #[serde(default)]
    pub json: bool,
    /// Also append plain-text logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "tether".to_string(),
            log_level: "info".to_string(),
            json: false,
            log_file: None,
        }
    }
}

impl InstrumentationConfig {
    /// Create configuration from environment variables
    ///
    /// Supports the following environment variables:
    /// - `TETHER_SERVICE_NAME`: Service name
    /// - `RUST_LOG`: Log level filter
    /// - `TETHER_LOG_FORMAT`: `json` for structured output
    /// - `TETHER_LOG_FILE`: Path of an additional log file
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("TETHER_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            json: std::env::var("TETHER_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            log_file: std::env::var_os("TETHER_LOG_FILE").map(PathBuf::from),
        }
    }

    /// Same configuration with a different level filter
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InstrumentationConfig::default();
        assert_eq!(config.service_name, "tether");
        assert_eq!(config.log_level, "info");
        assert!(!config.json);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_with_level() {
        let config = InstrumentationConfig::default().with_level("debug");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_name, "tether");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: InstrumentationConfig =
            serde_json::from_str(r#"{"service_name":"cli","log_level":"warn"}"#).unwrap();
        assert_eq!(config.log_level, "warn");
        assert!(!config.json);
    }
}
