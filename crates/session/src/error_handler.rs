//! Central handler for terminal failures
//!
//! Every failure that ends a session goes through here: it is turned into a
//! user-facing notice, the session record is cleared and the visible
//! location is reset.

use std::sync::Weak;

use tether_core::Notice;
use tether_http::{ClientError, FailureSink, ServerCode};

use crate::error::SessionError;
use crate::lifecycle::Inner;

/// Notice shown for a dispatch failure
#[must_use]
pub fn notice_for(error: &ClientError) -> Notice {
    match error.code() {
        Some(ServerCode::ExpiredSignature) => {
            return Notice::info("Your session has expired. Please sign in again.");
        }
        Some(ServerCode::InvalidAudience) => {
            return Notice::danger("The token was not issued for this client (invalid audience).");
        }
        Some(ServerCode::InvalidIssuer) => {
            return Notice::danger("The token issuer is invalid. Contact support.");
        }
        Some(ServerCode::InvalidToken | ServerCode::RevokedToken | ServerCode::ReuseDetected) => {
            return Notice::danger("Invalid or corrupt token. Please sign in again.");
        }
        Some(ServerCode::InvalidCredentials) => {
            return Notice::danger("Wrong username or password.");
        }
        _ => {}
    }

    match error {
        ClientError::Blocked {
            message,
            until: Some(until),
            ..
        } => Notice::warning(format!("Blocked: {message} until {until}")),
        ClientError::Blocked { .. } => {
            Notice::warning("Too many attempts. Wait a moment before trying again.")
        }
        ClientError::Unauthorized { .. } | ClientError::RequestFailed { status: 401, .. } => {
            Notice::danger("Wrong username or password.")
        }
        ClientError::Timeout { .. } | ClientError::RequestFailed { .. } => {
            Notice::danger(error.to_string())
        }
        other => Notice::danger(format!("Unexpected error: {other}")),
    }
}

/// Notice shown for a lifecycle failure
#[must_use]
pub fn notice_for_session(error: &SessionError) -> Notice {
    match error {
        SessionError::ExpiredClientSide { .. } => {
            Notice::info("Your session has expired. Please sign in again.")
        }
        SessionError::TokenReused => {
            Notice::danger("Token reused or invalid. The session has been revoked.")
        }
        SessionError::RefreshFailed { .. } => {
            Notice::warning("Could not renew the session. Please sign in again.")
        }
        SessionError::LoginFailed { message, .. } => {
            Notice::danger(format!("Login failed: {message}"))
        }
        SessionError::DeviceMissing => Notice::danger("No device is registered for this browser."),
        SessionError::Http(err) => notice_for(err),
        other => Notice::danger(format!("Unexpected error: {other}")),
    }
}

/// [`FailureSink`] wired into the dispatch engine by the lifecycle
/// controller
pub(crate) struct CentralHandler {
    lifecycle: Weak<Inner>,
}

impl CentralHandler {
    pub(crate) const fn new(lifecycle: Weak<Inner>) -> Self {
        Self { lifecycle }
    }
}

impl FailureSink for CentralHandler {
    fn on_failure(&self, path: &str, error: &ClientError) {
        tracing::warn!(path, error = %error, "terminal request failure");
        if let Some(inner) = self.lifecycle.upgrade() {
            inner.terminate_locally(notice_for(error));
        }
    }
}
