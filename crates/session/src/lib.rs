//! Session and token lifecycle management for the tether auth client
//!
//! [`TokenLifecycle`] keeps a session alive: it counts down to access-token
//! expiry, refreshes silently and ends the session cleanly on logout or
//! revocation. [`SessionRegistry`] lists and revokes the account's device
//! sessions. [`Tether`] wires both onto one client and event bus.

pub mod audit;
pub mod config;
pub mod error;
pub mod error_handler;
pub mod lifecycle;
pub mod registry;

use std::sync::Arc;

use tether_core::{Clock, EventBus, KeyValueStore, SystemClock};
use tether_http::{AuthClient, Transport};

pub use audit::AuditLog;
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use error_handler::{notice_for, notice_for_session};
pub use lifecycle::{LifecycleConfig, TokenLifecycle};
pub use registry::SessionRegistry;

/// Every component of a client session, sharing one event bus
#[derive(Debug, Clone)]
pub struct Tether {
    pub client: AuthClient,
    pub lifecycle: TokenLifecycle,
    pub registry: SessionRegistry,
    pub audit: AuditLog,
}

impl Tether {
    /// Assemble from configuration over `store`
    pub fn new(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> SessionResult<Self> {
        Self::builder(config, store).build()
    }

    #[must_use]
    pub fn builder(config: &SessionConfig, store: Arc<dyn KeyValueStore>) -> TetherBuilder<'_> {
        TetherBuilder {
            config,
            store,
            transport: None,
            clock: None,
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        self.client.events()
    }
}

/// Builder for [`Tether`]
pub struct TetherBuilder<'a> {
    config: &'a SessionConfig,
    store: Arc<dyn KeyValueStore>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TetherBuilder<'_> {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> SessionResult<Tether> {
        let mut client = AuthClient::builder()
            .config(self.config.client.clone())
            .store(self.store);
        if let Some(transport) = self.transport {
            client = client.transport(transport);
        }
        let client = client.build()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let lifecycle =
            TokenLifecycle::with_clock(client.clone(), LifecycleConfig::from(self.config), clock);
        let registry = SessionRegistry::new(lifecycle.clone());
        let audit = AuditLog::new(client.clone());

        Ok(Tether {
            client,
            lifecycle,
            registry,
            audit,
        })
    }
}
