//! Session registry client
//!
//! Lists and revokes the device sessions of the signed-in account and
//! polls the registry so a server-side revocation of this device is noticed
//! without user interaction.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tether_core::rt::{self, TaskHandle};
use tether_core::{
    DeviceSession, EventName, Notice, SessionEvent, SessionStatus, SubscriptionId,
};
use tether_http::types::{ActiveSessions, RevokeRequest};
use tether_http::{AuthClient, RequestOptions};

use crate::error::SessionResult;
use crate::lifecycle::TokenLifecycle;

struct Poller {
    interval: Duration,
    _task: TaskHandle,
}

struct RegistryInner {
    client: AuthClient,
    lifecycle: TokenLifecycle,
    poller: Mutex<Option<Poller>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// Handle to the registry client; clones share one poller
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(lifecycle: TokenLifecycle) -> Self {
        let inner = Arc::new(RegistryInner {
            client: lifecycle.client().clone(),
            lifecycle,
            poller: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
        });

        let events = inner.lifecycle.events().clone();
        let mut ids = Vec::with_capacity(3);
        for name in [EventName::Refreshed, EventName::SessionsChanged] {
            let weak = Arc::downgrade(&inner);
            ids.push(events.subscribe(name, move |_| repoll(&weak)));
        }
        let weak = Arc::downgrade(&inner);
        ids.push(events.subscribe(EventName::LoggedOut, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.stop_polling();
            }
        }));
        *inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ids;

        Self { inner }
    }

    /// List device sessions, optionally filtered by server status.
    ///
    /// If this device's own row comes back revoked, the controller is asked
    /// to log out before the list is returned.
    pub async fn list_active(
        &self,
        status: Option<SessionStatus>,
    ) -> SessionResult<ActiveSessions> {
        self.inner.list_active(status).await
    }

    /// Revoke one device session.
    ///
    /// Revoking this device's own session always ends the local session,
    /// even when the server call fails; the failure is still returned.
    pub async fn revoke(&self, target: &DeviceSession) -> SessionResult<()> {
        let inner = &self.inner;
        let session = inner.client.session();
        let request = RevokeRequest::for_session(target, session.user_agent());
        let own = session
            .device_id()
            .is_some_and(|device_id| target.is_device(&device_id));

        if own {
            tracing::info!(device_id = %target.device_id, "revoking this device's own session");
            let result = inner
                .client
                .revoke_session(&request, RequestOptions::single_shot())
                .await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "self-revocation notification failed, clearing locally");
            }
            inner.lifecycle.handle_revocation(&target.device_id).await;
            return result.map(drop).map_err(Into::into);
        }

        let response = inner
            .client
            .revoke_session(&request, RequestOptions::default())
            .await?;
        tracing::info!(device_id = %target.device_id, "device session revoked");
        let events = inner.lifecycle.events();
        events.notify(Notice::success(
            response
                .msg
                .unwrap_or_else(|| format!("Session on {} revoked", target.device_id)),
        ));
        events.publish(SessionEvent::SessionsChanged);
        Ok(())
    }

    /// Poll the registry every `interval`, replacing any running poller
    pub fn start_polling(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let task = rt::spawn_abortable(async move {
            loop {
                rt::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.poll_once().await;
            }
        });

        tracing::debug!(?interval, "registry polling started");
        let previous = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Poller {
                interval,
                _task: task,
            });
        drop(previous);
    }

    pub fn stop_polling(&self) {
        self.inner.stop_polling();
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poll_interval().is_some()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|poller| poller.interval)
    }
}

impl RegistryInner {
    async fn list_active(&self, status: Option<SessionStatus>) -> SessionResult<ActiveSessions> {
        let sessions = self
            .client
            .list_active(status.as_ref().map(SessionStatus::as_str))
            .await?;
        tracing::debug!(count = sessions.count, "active sessions listed");
        self.lifecycle
            .events()
            .publish(SessionEvent::SessionsListed {
                count: sessions.count,
            });

        if let Some(device_id) = self.client.session().device_id()
            && sessions
                .current(&device_id)
                .is_some_and(|row| row.status == SessionStatus::Revoked)
        {
            self.lifecycle.handle_revocation(&device_id).await;
        }
        Ok(sessions)
    }

    async fn poll_once(&self) {
        if !self.lifecycle.state().is_authenticated() {
            tracing::debug!("not authenticated, skipping registry poll");
            return;
        }
        if let Err(e) = self.list_active(None).await {
            tracing::warn!(error = %e, "registry poll failed");
        }
    }

    fn stop_polling(&self) {
        let previous = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::debug!("registry polling stopped");
        }
    }

    fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let ids = std::mem::take(
            self.subscriptions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let events = self.lifecycle.events();
        for id in ids {
            events.unsubscribe(id);
        }
    }
}

fn repoll(registry: &Weak<RegistryInner>) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    if !inner.is_polling() {
        return;
    }
    rt::spawn(async move {
        inner.poll_once().await;
    });
}
