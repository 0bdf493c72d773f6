//! Request and response bodies of the auth API

use serde::{Deserialize, Serialize};
use tether_core::{AuditLogEntry, BrowserInfo, DeviceSession, LogoutReason, Role};

/// Body of both login endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Device id
    pub device: String,
    pub role: Role,
    /// Browser hint derived from the raw user agent
    pub user_agent: BrowserInfo,
}

/// Successful login; `exp` and `jti` only come from newer servers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, alias = "role")]
    pub rol: Option<Role>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

/// Identity reported by the dashboard probe
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardResponse {
    pub username: String,
    #[serde(alias = "role")]
    pub rol: Role,
    pub device_id: String,
    pub exp: i64,
    #[serde(default)]
    pub jti: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_id: String,
    pub user_agent: String,
}

/// Token set minted by a refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub device_id: String,
    pub username: String,
    #[serde(alias = "role")]
    pub rol: Role,
    pub exp: i64,
    #[serde(default)]
    pub jti: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub device_id: Option<String>,
    pub reason: LogoutReason,
}

/// Plain `{msg}` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ActiveSessionsRequest {
    #[serde(rename = "filtro_status")]
    pub status: Option<String>,
}

/// Device sessions currently tracked by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActiveSessions {
    pub count: usize,
    #[serde(default)]
    pub sessions: Vec<DeviceSession>,
}

impl ActiveSessions {
    /// The row describing `device_id`, if listed
    #[must_use]
    pub fn current(&self, device_id: &str) -> Option<&DeviceSession> {
        self.sessions.iter().find(|s| s.is_device(device_id))
    }

    /// Rows of every other device
    pub fn others<'a>(&'a self, device_id: &'a str) -> impl Iterator<Item = &'a DeviceSession> {
        self.sessions.iter().filter(move |s| !s.is_device(device_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevokeRequest {
    pub user_id: String,
    pub username: String,
    pub device_id: String,
    pub user_rol: Option<String>,
    pub refresh_token: Option<String>,
    pub user_agent: Option<String>,
}

impl RevokeRequest {
    /// Request revoking `session`, sent with the caller's raw user agent
    #[must_use]
    pub fn for_session(session: &DeviceSession, user_agent: Option<String>) -> Self {
        Self {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            device_id: session.device_id.clone(),
            user_rol: session.role.clone(),
            refresh_token: session.refresh_token.clone(),
            user_agent,
        }
    }
}

/// Audit log page request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub event_type: Option<String>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            page: 1,
            limit: 10,
            event_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditPage {
    pub total_count: u64,
    #[serde(default)]
    pub logs: Vec<AuditLogEntry>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AuditPage {
    /// Number of pages of `limit` entries; at least one
    #[must_use]
    pub fn total_pages(&self, limit: u32) -> u64 {
        let limit = u64::from(limit.max(1));
        self.total_count.div_ceil(limit).max(1)
    }

    pub fn suspicious(&self) -> impl Iterator<Item = &AuditLogEntry> {
        self.logs.iter().filter(|entry| entry.is_suspicious())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::SessionStatus;

    #[test]
    fn login_request_wire_shape() {
        let body = serde_json::to_value(LoginRequest {
            username: "ana".into(),
            password: "pw".into(),
            device: "d-1".into(),
            role: Role::Admin,
            user_agent: BrowserInfo {
                browser: "Firefox".into(),
                os: "Linux".into(),
            },
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "username": "ana",
                "password": "pw",
                "device": "d-1",
                "role": "Admin",
                "user_agent": {"browser": "Firefox", "os": "Linux"}
            })
        );
    }

    #[test]
    fn active_sessions_from_server() {
        let sessions: ActiveSessions = serde_json::from_value(json!({
            "count": 2,
            "sessions": [
                {"session_id": "s1", "user_id": "u1", "username": "ana", "device_id": "d-1",
                 "rol": "User", "browser": "Chrome", "sistena": "Linux", "status": "active",
                 "login_at": 1700000000, "last_refresh_at": 1700000100, "is_revoked": false},
                {"user_id": "u1", "username": "ana", "device_id": "d-2", "status": "revoked"}
            ]
        }))
        .unwrap();

        let current = sessions.current("d-1").unwrap();
        assert_eq!(current.os.as_deref(), Some("Linux"));
        assert_eq!(current.status, SessionStatus::Active);
        assert_eq!(sessions.others("d-1").count(), 1);
    }

    #[test]
    fn audit_pages() {
        let page: AuditPage = serde_json::from_value(json!({
            "total_count": 21,
            "logs": [
                {"event_type": "login"},
                {"event_type": "password_change"}
            ]
        }))
        .unwrap();
        assert_eq!(page.total_pages(10), 3);
        assert_eq!(page.suspicious().count(), 1);

        let empty = AuditPage {
            total_count: 0,
            logs: vec![],
            page: None,
            limit: None,
        };
        assert_eq!(empty.total_pages(10), 1);
    }

    #[test]
    fn logout_reason_on_the_wire() {
        let body = serde_json::to_value(LogoutRequest {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            device_id: Some("d".into()),
            reason: LogoutReason::NoRefreshToken,
        })
        .unwrap();
        assert_eq!(body["reason"], "no-refresh-token");
    }
}
