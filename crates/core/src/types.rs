use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Role an account authenticates as. Selects the login and dashboard
/// endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(CoreError::invalid_config(format!("unknown role '{other}'"))),
        }
    }
}

/// Server-side status of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Revoked,
    Expired,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(CoreError::invalid_config(format!(
                "unknown session status '{other}'"
            ))),
        }
    }
}

/// One login on one device, as tracked by the server. Read-only on the
/// client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSession {
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_id: String,
    pub username: String,
    pub device_id: String,
    #[serde(default, rename = "rol", alias = "role")]
    pub role: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default, alias = "sistena")]
    pub os: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub login_at: Option<i64>,
    #[serde(default)]
    pub last_refresh_at: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl DeviceSession {
    /// Whether this row describes the device identified by `device_id`
    #[must_use]
    pub fn is_device(&self, device_id: &str) -> bool {
        self.device_id == device_id
    }
}

/// Audit events the admin panel highlights
pub const SUSPICIOUS_EVENTS: &[&str] = &[
    "ip_change",
    "user_agent_change",
    "revoked",
    "multiple_attempts",
    "logout",
    "expiration",
    "login",
];

/// Server-owned audit record; display only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub old_value: JsonValue,
    #[serde(default)]
    pub new_value: JsonValue,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl AuditLogEntry {
    #[must_use]
    pub fn is_suspicious(&self) -> bool {
        let event = self.event_type.to_ascii_lowercase();
        SUSPICIOUS_EVENTS.iter().any(|keyword| event.contains(keyword))
    }
}

/// Coarse browser and OS hint derived from a user-agent string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub browser: String,
    pub os: String,
}

impl BrowserInfo {
    pub const UNKNOWN: &'static str = "Unknown";

    #[must_use]
    pub fn from_user_agent(ua: &str) -> Self {
        let browser = if ua.contains("Chrome") && !ua.contains("Edg") {
            "Chrome"
        } else if ua.contains("Firefox") {
            "Firefox"
        } else if ua.contains("Safari") && !ua.contains("Chrome") {
            "Safari"
        } else if ua.contains("Edg") {
            "Edge"
        } else if ua.contains("OPR") || ua.contains("Opera") {
            "Opera"
        } else {
            Self::UNKNOWN
        };

        // Android and iOS agents also mention Linux / Mac OS, so check them first
        let os = if ua.contains("Windows") {
            "Windows"
        } else if ua.contains("Android") {
            "Android"
        } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
            "iOS"
        } else if ua.contains("Mac OS") {
            "MacOS"
        } else if ua.contains("Linux") {
            "Linux"
        } else {
            Self::UNKNOWN
        };

        Self {
            browser: browser.to_string(),
            os: os.to_string(),
        }
    }
}

/// State of the token lifecycle controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unauthenticated,
    Authenticated,
    Expiring,
    Refreshing,
    Revoked,
}

impl LifecycleState {
    /// States in which the stored credentials are usable
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Expiring | Self::Refreshing)
    }
}

/// Why a session was ended. Sent to the server on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogoutReason {
    #[serde(rename = "logout")]
    UserRequested,
    #[serde(rename = "refresh_failed")]
    RefreshFailed,
    #[serde(rename = "token_reused")]
    TokenReused,
    #[serde(rename = "no-refresh-token")]
    NoRefreshToken,
    #[serde(rename = "revoked")]
    Revoked,
    #[serde(rename = "expiration")]
    Expired,
}

impl LogoutReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequested => "logout",
            Self::RefreshFailed => "refresh_failed",
            Self::TokenReused => "token_reused",
            Self::NoRefreshToken => "no-refresh-token",
            Self::Revoked => "revoked",
            Self::Expired => "expiration",
        }
    }

    /// Lifecycle state entered once local cleanup for this reason is done
    #[must_use]
    pub const fn terminal_state(&self) -> LifecycleState {
        match self {
            Self::UserRequested | Self::TokenReused | Self::Revoked => LifecycleState::Revoked,
            Self::RefreshFailed | Self::NoRefreshToken | Self::Expired => {
                LifecycleState::Unauthenticated
            }
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
