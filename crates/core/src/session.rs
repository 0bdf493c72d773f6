//! The Session Record and its mapping onto a [`KeyValueStore`]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::CoreResult;
use crate::store::{KeyValueStore, StoreOp};
use crate::types::Role;

/// Attribute names under which the record is persisted
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const DEVICE_ID: &str = "device_id";
    pub const USERNAME: &str = "username";
    pub const ROLE: &str = "rol";
    pub const EXP: &str = "exp";
    pub const JTI: &str = "jti";
    pub const USER_AGENT: &str = "user_agent";
    pub const LAST_REFRESH_AT: &str = "last_refresh_at";

    /// Everything a session clear removes
    pub const SESSION: &[&str] = &[
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        USERNAME,
        ROLE,
        EXP,
        JTI,
        LAST_REFRESH_AT,
    ];
}

/// Current authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub device_id: String,
    pub username: String,
    pub role: Role,
    /// Access-token expiry, seconds since the epoch
    pub exp: i64,
    pub jti: Option<String>,
    pub last_refresh_at: Option<i64>,
}

impl SessionRecord {
    /// Seconds until expiry at `now`; negative once expired
    #[must_use]
    pub const fn remaining(&self, now: i64) -> i64 {
        self.exp - now
    }
}

/// Typed access to the session attributes held in a store.
///
/// The device id and raw user agent live alongside the record but outlive
/// it: [`SessionStore::clear`] leaves them in place.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("entries", &self.store.count())
            .finish()
    }
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Read the full record. A partially populated record reads as `None`.
    #[must_use]
    pub fn load(&self) -> Option<SessionRecord> {
        let role = match self.store.get(keys::ROLE)?.parse() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(error = %e, "stored role is invalid");
                return None;
            }
        };

        Some(SessionRecord {
            access_token: self.store.get(keys::ACCESS_TOKEN)?,
            refresh_token: self.store.get(keys::REFRESH_TOKEN)?,
            device_id: self.store.get(keys::DEVICE_ID)?,
            username: self.store.get(keys::USERNAME)?,
            role,
            exp: self.exp()?,
            jti: self.store.get(keys::JTI),
            last_refresh_at: self
                .store
                .get(keys::LAST_REFRESH_AT)
                .and_then(|v| v.parse().ok()),
        })
    }

    /// Write every attribute of `record` in one batch
    pub fn save(&self, record: &SessionRecord) -> CoreResult<()> {
        let exp = record.exp.to_string();
        let last_refresh_at = record.last_refresh_at.map(|t| t.to_string());

        let mut ops = vec![
            StoreOp::Set(keys::ACCESS_TOKEN, &record.access_token),
            StoreOp::Set(keys::REFRESH_TOKEN, &record.refresh_token),
            StoreOp::Set(keys::DEVICE_ID, &record.device_id),
            StoreOp::Set(keys::USERNAME, &record.username),
            StoreOp::Set(keys::ROLE, record.role.as_str()),
            StoreOp::Set(keys::EXP, &exp),
        ];
        ops.push(match &record.jti {
            Some(jti) => StoreOp::Set(keys::JTI, jti),
            None => StoreOp::Remove(keys::JTI),
        });
        ops.push(match &last_refresh_at {
            Some(at) => StoreOp::Set(keys::LAST_REFRESH_AT, at),
            None => StoreOp::Remove(keys::LAST_REFRESH_AT),
        });

        self.store.apply(&ops)
    }

    /// Store the identity returned by a dashboard probe. The device id is
    /// never overwritten.
    pub fn store_identity(
        &self,
        username: &str,
        role: Role,
        exp: i64,
        jti: Option<&str>,
    ) -> CoreResult<()> {
        let exp = exp.to_string();
        let mut ops = vec![
            StoreOp::Set(keys::USERNAME, username),
            StoreOp::Set(keys::ROLE, role.as_str()),
            StoreOp::Set(keys::EXP, &exp),
        ];
        if let Some(jti) = jti {
            ops.push(StoreOp::Set(keys::JTI, jti));
        }
        self.store.apply(&ops)
    }

    /// Remove every session attribute in one batch
    pub fn clear(&self) -> CoreResult<()> {
        let ops: Vec<_> = keys::SESSION.iter().copied().map(StoreOp::Remove).collect();
        self.store.apply(&ops)
    }

    #[must_use]
    pub fn device_id(&self) -> Option<String> {
        self.store.get(keys::DEVICE_ID)
    }

    /// Stored device id, generating and persisting one on first use
    pub fn ensure_device_id(&self) -> CoreResult<String> {
        if let Some(id) = self.device_id() {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.store.set(keys::DEVICE_ID, &id)?;
        tracing::info!(device_id = %id, "generated device id");
        Ok(id)
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.store.get(keys::ACCESS_TOKEN)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(keys::REFRESH_TOKEN)
    }

    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        self.store.get(keys::EXP)?.parse().ok()
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.store.get(keys::USERNAME)
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.store.get(keys::ROLE)?.parse().ok()
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<String> {
        self.store.get(keys::USER_AGENT)
    }

    pub fn set_user_agent(&self, user_agent: &str) -> CoreResult<()> {
        self.store.set(keys::USER_AGENT, user_agent)
    }
}
