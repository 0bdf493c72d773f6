//! Token lifecycle controller
//!
//! Owns the countdown against the access-token expiry, performs silent
//! refresh, and drives login and logout. At most one refresh is ever in
//! flight: concurrent callers wait for the running attempt and share its
//! result.

mod countdown;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tether_core::{
    BrowserInfo, Clock, EventBus, LifecycleState, LogoutReason, Notice, Role, SessionEvent,
    SessionRecord, SessionStore, SystemClock, rt,
};
use tether_http::AuthClient;
use tether_http::types::{
    DashboardResponse, LoginRequest, LogoutRequest, RefreshRequest, TokenSet,
};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::error_handler::{CentralHandler, notice_for, notice_for_session};
use countdown::Countdown;

/// Timing knobs of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub expiring_threshold_secs: i64,
    pub tick: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiring_threshold_secs: 30,
            tick: Duration::from_secs(1),
        }
    }
}

impl From<&SessionConfig> for LifecycleConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            expiring_threshold_secs: config.expiring_threshold_secs,
            tick: config.tick(),
        }
    }
}

/// Location the UI returns to after the session ends
const HOME: &str = "/";
const HOME_REVOKED: &str = "/?revoked=true";

pub(crate) struct Inner {
    client: AuthClient,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    state: Mutex<LifecycleState>,
    countdown: Mutex<Option<Countdown>>,
    refresh_gate: tokio::sync::Mutex<()>,
    refresh_generation: AtomicU64,
    last_refresh: Mutex<Option<SessionResult<TokenSet>>>,
    this: Weak<Inner>,
}

/// Handle to the token lifecycle controller; cheap to clone
#[derive(Clone)]
pub struct TokenLifecycle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TokenLifecycle {
    /// Controller on the system clock
    pub fn new(client: AuthClient, config: LifecycleConfig) -> Self {
        Self::with_clock(client, config, Arc::new(SystemClock))
    }

    /// Controller on `clock`. Installs the central failure handler on
    /// `client`.
    pub fn with_clock(client: AuthClient, config: LifecycleConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Arc::new_cyclic(|this| Inner {
            events: client.events().clone(),
            client,
            clock,
            config,
            state: Mutex::new(LifecycleState::Unauthenticated),
            countdown: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            last_refresh: Mutex::new(None),
            this: this.clone(),
        });
        inner
            .client
            .set_failure_sink(Arc::new(CentralHandler::new(Arc::downgrade(&inner))));
        Self { inner }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.inner.client
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The stored record, if complete
    #[must_use]
    pub fn record(&self) -> Option<SessionRecord> {
        self.session().load()
    }

    fn session(&self) -> &SessionStore {
        self.inner.client.session()
    }

    /// Expiry the countdown is currently armed against
    #[must_use]
    pub fn armed_expiry(&self) -> Option<i64> {
        self.inner
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Countdown::exp)
    }

    /// Authenticate and start the countdown.
    ///
    /// When the server omits `exp`, the dashboard is probed with the new
    /// access token before anything is stored, so token and expiry are
    /// always written together.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> SessionResult<SessionRecord> {
        let session = self.session();
        let device_id = session.ensure_device_id()?;
        let user_agent = self.inner.client.config().user_agent.clone();
        session.set_user_agent(&user_agent)?;

        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            device: device_id.clone(),
            role,
            user_agent: BrowserInfo::from_user_agent(&user_agent),
        };
        let response = self
            .inner
            .client
            .login(&request)
            .await
            .map_err(SessionError::login_failed)?;

        if let Some(server_device) = &response.device_id
            && *server_device != device_id
        {
            tracing::warn!(%device_id, %server_device, "server echoed a different device id");
        }
        let role = response.rol.unwrap_or(role);

        let (username, exp, jti) = match response.exp {
            Some(exp) => (
                response.username.clone().unwrap_or_else(|| username.to_string()),
                exp,
                response.jti.clone(),
            ),
            None => {
                let probe = self
                    .inner
                    .client
                    .dashboard_with_token(role, &response.access_token)
                    .await
                    .map_err(SessionError::login_failed)?;
                (probe.username, probe.exp, probe.jti)
            }
        };
        if exp <= self.inner.clock.now() {
            return Err(SessionError::ExpiredClientSide { exp });
        }

        let record = SessionRecord {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            device_id,
            username,
            role,
            exp,
            jti,
            last_refresh_at: None,
        };
        session.save(&record)?;

        tracing::info!(username = %record.username, role = %record.role, exp, "logged in");
        self.inner.set_state(LifecycleState::Authenticated);
        self.inner.arm_countdown(exp);
        self.inner
            .events
            .notify(Notice::success(format!("Welcome, {}", record.username)));
        Ok(record)
    }

    /// Confirm the stored session with the server and store the identity it
    /// reports
    pub async fn probe_dashboard(&self, role: Role) -> SessionResult<DashboardResponse> {
        let session = self.session();
        let Some(device_id) = session.device_id() else {
            return Err(SessionError::DeviceMissing);
        };

        let probe = self.inner.client.dashboard(role).await?;
        if probe.exp <= self.inner.clock.now() {
            return Err(SessionError::ExpiredClientSide { exp: probe.exp });
        }
        if probe.device_id != device_id {
            tracing::warn!(
                %device_id,
                server_device = %probe.device_id,
                "dashboard echoed a different device id"
            );
        }

        session.store_identity(
            &probe.username,
            probe.rol,
            probe.exp,
            probe.jti.as_deref(),
        )?;
        if self.state().is_authenticated() {
            self.inner.arm_countdown(probe.exp);
        }
        Ok(probe)
    }

    /// Restore the lifecycle from a stored record, e.g. after a restart
    pub async fn resume(&self) -> SessionResult<LifecycleState> {
        let Some(record) = self.record() else {
            self.inner.set_state(LifecycleState::Unauthenticated);
            return Ok(LifecycleState::Unauthenticated);
        };

        if record.exp <= self.inner.clock.now() {
            let expired = SessionError::ExpiredClientSide { exp: record.exp };
            tracing::info!(exp = record.exp, "stored access token already expired");
            self.inner.events.notify(notice_for_session(&expired));
            self.inner.set_state(LifecycleState::Authenticated);
            self.refresh().await?;
            return Ok(self.state());
        }

        self.inner.set_state(LifecycleState::Authenticated);
        self.inner.arm_countdown(record.exp);
        Ok(LifecycleState::Authenticated)
    }

    /// Exchange the refresh token for a new token set.
    ///
    /// If a refresh is already running, waits for it and returns its
    /// result instead of issuing a second call.
    pub async fn refresh(&self) -> SessionResult<TokenSet> {
        self.inner.refresh().await
    }

    /// End the session.
    ///
    /// The server is notified first, best-effort; the local record is
    /// cleared afterwards whatever the outcome, even if this future is
    /// dropped mid-flight.
    pub async fn logout(&self, reason: LogoutReason) {
        self.inner.logout(reason).await;
    }

    /// React to a server revocation of `device_id`
    pub async fn handle_revocation(&self, device_id: &str) {
        let own = self
            .session()
            .device_id()
            .is_some_and(|own| own == device_id);
        if !own {
            self.inner.events.publish(SessionEvent::SessionsChanged);
            return;
        }

        tracing::warn!(%device_id, "this device's session was revoked");
        self.inner.events.publish(SessionEvent::Revoked {
            device_id: device_id.to_string(),
        });
        self.inner
            .events
            .notify(Notice::danger("This session was revoked."));
        self.inner.logout(LogoutReason::Revoked).await;
    }
}

impl Inner {
    fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, to: LifecycleState) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            tracing::debug!(?from, ?to, "lifecycle transition");
            self.events.publish(SessionEvent::StateChanged { from, to });
        }
    }

    fn arm_countdown(&self, exp: i64) {
        self.install_countdown(exp, false);
    }

    fn install_countdown(&self, exp: i64, refreshed: bool) {
        let countdown = Countdown::start(self.this.clone(), exp, self.config.tick, refreshed);
        // The previous countdown, if any, stops when dropped here
        let previous = std::mem::replace(
            &mut *self.countdown.lock().unwrap_or_else(PoisonError::into_inner),
            countdown,
        );
        drop(previous);
    }

    fn stop_countdown(&self) {
        let previous = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(previous);
    }

    fn spawn_refresh(&self) {
        let Some(inner) = self.this.upgrade() else {
            return;
        };
        rt::spawn(async move {
            if let Err(e) = inner.refresh().await {
                tracing::warn!(error = %e, "silent refresh failed");
            }
        });
    }

    fn on_threshold(&self, remaining: i64) {
        if self.state() != LifecycleState::Authenticated {
            return;
        }
        tracing::info!(remaining, "access token near expiry, refreshing");
        self.set_state(LifecycleState::Expiring);
        self.spawn_refresh();
    }

    fn on_expired(&self, exp: i64) {
        if !self.state().is_authenticated() {
            return;
        }
        tracing::info!(exp, "access token expired client-side");
        self.events
            .notify(notice_for_session(&SessionError::ExpiredClientSide { exp }));
        self.spawn_refresh();
    }

    async fn refresh(&self) -> SessionResult<TokenSet> {
        let observed = self.refresh_generation.load(Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;

        if self.refresh_generation.load(Ordering::SeqCst) != observed {
            let shared = self
                .last_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(result) = shared {
                tracing::debug!("joined an in-flight refresh");
                return result;
            }
        }

        let result = self.refresh_now().await;
        *self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn refresh_now(&self) -> SessionResult<TokenSet> {
        let session = self.client.session();
        let Some(refresh_token) = session.refresh_token() else {
            tracing::warn!("refresh requested without a refresh token");
            self.logout(LogoutReason::NoRefreshToken).await;
            return Err(SessionError::NotAuthenticated);
        };
        let device_id = session.ensure_device_id()?;
        let user_agent = session
            .user_agent()
            .unwrap_or_else(|| self.client.config().user_agent.clone());

        self.set_state(LifecycleState::Refreshing);
        let request = RefreshRequest {
            refresh_token,
            device_id: device_id.clone(),
            user_agent,
        };

        let error = match self.client.refresh(&request).await {
            Ok(tokens) if tokens.exp <= self.clock.now() => {
                tracing::warn!(exp = tokens.exp, "refresh returned an already expired token");
                SessionError::ExpiredClientSide { exp: tokens.exp }
            }
            Ok(tokens) => match self.store_tokens(&tokens, &device_id) {
                Ok(()) => {
                    tracing::info!(exp = tokens.exp, "token refreshed");
                    self.set_state(LifecycleState::Authenticated);
                    self.install_countdown(tokens.exp, true);
                    self.events
                        .publish(SessionEvent::Refreshed { exp: tokens.exp });
                    return Ok(tokens);
                }
                Err(e) => e,
            },
            Err(err) if err.status() == Some(403) => {
                tracing::warn!(error = %err, "refresh rejected, token reuse suspected");
                SessionError::TokenReused
            }
            Err(err) => {
                tracing::warn!(error = %err, "refresh failed");
                SessionError::RefreshFailed {
                    message: err.to_string(),
                }
            }
        };

        self.events.notify(notice_for_session(&error));
        let reason = if error == SessionError::TokenReused {
            LogoutReason::TokenReused
        } else {
            LogoutReason::RefreshFailed
        };
        self.logout(reason).await;
        Err(error)
    }

    fn store_tokens(&self, tokens: &TokenSet, device_id: &str) -> SessionResult<()> {
        if tokens.device_id != device_id {
            tracing::warn!(
                %device_id,
                server_device = %tokens.device_id,
                "refresh echoed a different device id"
            );
        }
        let record = SessionRecord {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            device_id: device_id.to_string(),
            username: tokens.username.clone(),
            role: tokens.rol,
            exp: tokens.exp,
            jti: tokens.jti.clone(),
            last_refresh_at: Some(self.clock.now()),
        };
        self.client.session().save(&record)?;
        Ok(())
    }

    async fn logout(&self, reason: LogoutReason) {
        let _cleanup = LocalCleanup {
            inner: self,
            reason,
        };

        let session = self.client.session();
        let request = LogoutRequest {
            access_token: session.access_token(),
            refresh_token: session.refresh_token(),
            device_id: session.device_id(),
            reason,
        };
        if request.access_token.is_none() && request.refresh_token.is_none() {
            tracing::debug!(%reason, "no credentials held, skipping server logout");
            return;
        }

        match self.client.logout(&request).await {
            Ok(response) => {
                tracing::info!(%reason, "logged out");
                self.events.notify(Notice::info(
                    response.msg.unwrap_or_else(|| "Signed out".to_string()),
                ));
            }
            Err(err) => {
                tracing::warn!(%reason, error = %err, "server logout failed, clearing locally");
                self.events.notify(notice_for(&err));
            }
        }
    }

    /// Clear local state after a terminal dispatch failure
    pub(crate) fn terminate_locally(&self, notice: Notice) {
        self.events.notify(notice);
        self.stop_countdown();
        if let Err(e) = self.client.session().clear() {
            tracing::error!(error = %e, "failed to clear session record");
        }
        self.set_state(LifecycleState::Unauthenticated);
        self.events.publish(SessionEvent::NavigationReset {
            location: HOME.to_string(),
        });
    }
}

/// Local half of a logout; runs on drop so cancellation cannot skip it
struct LocalCleanup<'a> {
    inner: &'a Inner,
    reason: LogoutReason,
}

impl Drop for LocalCleanup<'_> {
    fn drop(&mut self) {
        let inner = self.inner;
        inner.stop_countdown();
        if let Err(e) = inner.client.session().clear() {
            tracing::error!(error = %e, "failed to clear session record");
        }
        inner.set_state(self.reason.terminal_state());
        inner
            .events
            .publish(SessionEvent::LoggedOut { reason: self.reason });
        let location = if self.reason == LogoutReason::Revoked {
            HOME_REVOKED
        } else {
            HOME
        };
        inner.events.publish(SessionEvent::NavigationReset {
            location: location.to_string(),
        });
    }
}
