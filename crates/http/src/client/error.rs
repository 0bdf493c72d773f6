//! Client error types

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::ResponseBody;

/// Machine-readable `code` attached to server error bodies.
///
/// Parsed once when the failure is raised, so callers branch on the kind
/// instead of matching message text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ServerCode {
    ExpiredSignature,
    InvalidToken,
    InvalidAudience,
    InvalidIssuer,
    InvalidCredentials,
    UserBlocked,
    ReuseDetected,
    RevokedToken,
    DeviceMismatch,
    MaxAttemptsExceeded,
    TokenNotFound,
    MissingFields,
    Other(String),
    #[default]
    None,
}

impl ServerCode {
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "ExpiredSignatureError" | "Expired" | "TOKEN_EXPIRED" => Self::ExpiredSignature,
            "InvalidTokenError" | "DecodeError" | "INVALID_TOKEN" => Self::InvalidToken,
            "InvalidAudienceError" => Self::InvalidAudience,
            "InvalidIssuerError" => Self::InvalidIssuer,
            "INVALID_CREDENTIALS" | "INVALID_FAIL_CREDENTIALS" => Self::InvalidCredentials,
            "USER_BLOCKED" => Self::UserBlocked,
            "ReuseDetected" => Self::ReuseDetected,
            "RevokedToken" => Self::RevokedToken,
            "DeviceMismatch" => Self::DeviceMismatch,
            "MaxAttemptsExceeded" => Self::MaxAttemptsExceeded,
            "TOKEN_NOT_FOUND" => Self::TokenNotFound,
            "MISSING_FIELDS" | "INVALID_JSON" => Self::MissingFields,
            "" => Self::None,
            other => Self::Other(other.to_string()),
        }
    }

    /// Codes that mean the presented token can no longer be trusted
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::ExpiredSignature
                | Self::InvalidToken
                | Self::InvalidAudience
                | Self::InvalidIssuer
                | Self::ReuseDetected
                | Self::RevokedToken
        )
    }
}

impl fmt::Display for ServerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpiredSignature => f.write_str("ExpiredSignatureError"),
            Self::InvalidToken => f.write_str("InvalidTokenError"),
            Self::InvalidAudience => f.write_str("InvalidAudienceError"),
            Self::InvalidIssuer => f.write_str("InvalidIssuerError"),
            Self::InvalidCredentials => f.write_str("INVALID_CREDENTIALS"),
            Self::UserBlocked => f.write_str("USER_BLOCKED"),
            Self::ReuseDetected => f.write_str("ReuseDetected"),
            Self::RevokedToken => f.write_str("RevokedToken"),
            Self::DeviceMismatch => f.write_str("DeviceMismatch"),
            Self::MaxAttemptsExceeded => f.write_str("MaxAttemptsExceeded"),
            Self::TokenNotFound => f.write_str("TOKEN_NOT_FOUND"),
            Self::MissingFields => f.write_str("MISSING_FIELDS"),
            Self::Other(code) => f.write_str(code),
            Self::None => Ok(()),
        }
    }
}

/// Error body shape returned by the auth server
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    bloqueado_hasta: Option<String>,
}

fn until_suffix(until: Option<&String>) -> String {
    until.map(|u| format!(" until {u}")).unwrap_or_default()
}

/// Client error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The attempt exceeded its deadline and was cancelled
    #[error("request to {resource} timed out after {}ms", .deadline.as_millis())]
    Timeout { resource: String, deadline: Duration },

    /// Status 400
    #[error("bad request: {message} {code}")]
    BadRequest { message: String, code: ServerCode },

    /// Status 403; the account may be locked until `until`
    #[error("blocked: {message}{}", until_suffix(.until.as_ref()))]
    Blocked {
        message: String,
        code: ServerCode,
        until: Option<String>,
    },

    /// Status 401 while a refresh token is held
    #[error("unauthorized: {message} {code}")]
    Unauthorized { message: String, code: ServerCode },

    /// Any other non-success status
    #[error("request failed with status {status}: {message} {code}")]
    RequestFailed {
        status: u16,
        message: String,
        code: ServerCode,
    },

    /// Connection-level failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Classify a non-success response.
    ///
    /// Returns `None` for 2xx statuses. A 401 only counts as
    /// [`ClientError::Unauthorized`] when the caller holds a refresh token.
    #[must_use]
    pub fn from_response(
        status: u16,
        body: &ResponseBody,
        has_refresh_token: bool,
    ) -> Option<Self> {
        if (200..300).contains(&status) {
            return None;
        }

        let parsed = match body {
            ResponseBody::Json(value) => {
                serde_json::from_value::<ErrorBody>(value.clone()).unwrap_or_default()
            }
            ResponseBody::Text(_) => ErrorBody::default(),
        };
        let message = parsed.msg.unwrap_or_else(|| match body {
            ResponseBody::Text(text) if !text.is_empty() => text.clone(),
            _ => "unknown error".to_string(),
        });
        let code = parsed.code.as_deref().map_or(ServerCode::None, ServerCode::parse);

        Some(match status {
            400 => Self::BadRequest { message, code },
            403 => Self::Blocked {
                message,
                code,
                until: parsed.bloqueado_hasta,
            },
            401 if has_refresh_token => Self::Unauthorized { message, code },
            _ => Self::RequestFailed {
                status,
                message,
                code,
            },
        })
    }

    /// HTTP status behind the error, if a response was received
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest { .. } => Some(400),
            Self::Blocked { .. } => Some(403),
            Self::Unauthorized { .. } => Some(401),
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied code, if any
    #[must_use]
    pub const fn code(&self) -> Option<&ServerCode> {
        match self {
            Self::BadRequest { code, .. }
            | Self::Blocked { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::RequestFailed { code, .. } => Some(code),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
