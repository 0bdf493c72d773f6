//! CLI configuration utilities

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tether_session::SessionConfig;

/// Values given on the command line; they win over file and environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub state_dir: Option<PathBuf>,
}

/// Load the session configuration and apply command-line overrides
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<SessionConfig> {
    let mut config = SessionConfig::load(path)?;
    if let Some(base_url) = overrides.base_url {
        config.client.base_url = base_url;
    }
    if let Some(state_dir) = overrides.state_dir {
        config.state_dir = Some(state_dir);
    }
    if config.client.base_url.is_empty() {
        bail!("no auth service configured: pass --base-url or set TETHER_BASE_URL");
    }
    Ok(config)
}

/// Effective configuration as pretty JSON
pub fn render(config: &SessionConfig) -> Result<String> {
    let mut value = serde_json::to_value(config)?;
    value["state_dir"] = serde_json::Value::String(config.state_dir().display().to_string());
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win() {
        let config = load(
            None,
            Overrides {
                base_url: Some("http://auth.example".into()),
                state_dir: Some(PathBuf::from("/tmp/tether-cli")),
            },
        )
        .unwrap();
        assert_eq!(config.client.base_url, "http://auth.example");
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/tether-cli"));

        let rendered = render(&config).unwrap();
        assert!(rendered.contains("\"state_dir\": \"/tmp/tether-cli\""));
    }
}
