//! Dispatch engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::Role;

/// Paths of the auth API, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub admin_login: String,
    pub dashboard: String,
    pub admin_dashboard: String,
    pub refresh: String,
    pub logout: String,
    pub sessions_active: String,
    pub sessions_revoke: String,
    pub audit: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/acceso".to_string(),
            admin_login: "/api/auth/admin".to_string(),
            dashboard: "/api/auth/dashboard".to_string(),
            admin_dashboard: "/api/auth/admin/dashboard".to_string(),
            refresh: "/api/auth/refresh".to_string(),
            logout: "/api/auth/logout".to_string(),
            sessions_active: "/api/auth/sessions/active".to_string(),
            sessions_revoke: "/api/auth/sessions/revoke".to_string(),
            audit: "/api/auth/admin/audit".to_string(),
        }
    }
}

impl Endpoints {
    /// Authentication endpoint for `role`
    #[must_use]
    pub fn login_for(&self, role: Role) -> &str {
        match role {
            Role::User => &self.login,
            Role::Admin => &self.admin_login,
        }
    }

    /// Session probe endpoint for `role`
    #[must_use]
    pub fn dashboard_for(&self, role: Role) -> &str {
        match role {
            Role::User => &self.dashboard,
            Role::Admin => &self.admin_dashboard,
        }
    }
}

/// Dispatch engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-attempt deadline
    pub timeout_ms: u64,
    /// Attempts allowed after the first
    pub retries: u32,
    /// Delay before the first retry; doubles on each further one
    pub retry_delay_ms: u64,
    /// Raw user-agent string sent on login, refresh and revoke
    pub user_agent: String,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 8000,
            retries: 2,
            retry_delay_ms: 1000,
            user_agent: default_user_agent(),
            endpoints: Endpoints::default(),
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "tether/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
