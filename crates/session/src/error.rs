use tether_core::CoreError;
use tether_http::{ClientError, ServerCode};
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// Failures surfaced by the lifecycle controller and the session registry.
///
/// Clonable so that callers coalesced onto one refresh all receive the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The local clock says the access token expired before any server
    /// round-trip confirmed it
    #[error("access token expired at {exp} (checked client-side)")]
    ExpiredClientSide { exp: i64 },

    #[error("token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// 403 on refresh: the refresh token was reused or is invalid
    #[error("refresh token reused or invalid, session revoked")]
    TokenReused,

    #[error("login failed: {message}")]
    LoginFailed { message: String, code: ServerCode },

    /// Dashboard probe attempted with no device id recorded
    #[error("no device id recorded for this profile")]
    DeviceMissing,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Http(#[from] ClientError),

    #[error("session storage failed: {0}")]
    Store(#[from] CoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub(crate) fn login_failed(err: ClientError) -> Self {
        let code = err.code().cloned().unwrap_or_default();
        let message = match &err {
            ClientError::BadRequest { message, .. }
            | ClientError::Blocked { message, .. }
            | ClientError::Unauthorized { message, .. }
            | ClientError::RequestFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::LoginFailed { message, code }
    }

    /// Whether the error ends the current session
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed { .. }
                | Self::TokenReused
                | Self::NotAuthenticated
                | Self::Http(ClientError::Unauthorized { .. })
        )
    }
}

impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failure_keeps_server_message() {
        let err = SessionError::login_failed(ClientError::RequestFailed {
            status: 401,
            message: "Credenciales incorrectas".into(),
            code: ServerCode::InvalidCredentials,
        });
        assert_eq!(
            err,
            SessionError::LoginFailed {
                message: "Credenciales incorrectas".into(),
                code: ServerCode::InvalidCredentials,
            }
        );
    }

    #[test]
    fn terminal_errors() {
        assert!(SessionError::TokenReused.is_terminal());
        assert!(
            SessionError::Http(ClientError::Unauthorized {
                message: String::new(),
                code: ServerCode::None,
            })
            .is_terminal()
        );
        assert!(!SessionError::DeviceMissing.is_terminal());
    }
}
