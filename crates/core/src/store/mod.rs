//! Synchronous key-value storage behind one capability interface.
//!
//! Two families implement [`KeyValueStore`]: persistent stores (no expiry,
//! survive restart) and the expiring, path-scoped [`CookieStore`].

mod cookie;
#[cfg(not(target_arch = "wasm32"))]
mod file;
#[cfg(target_arch = "wasm32")]
mod local_storage;
mod memory;

pub use cookie::{CookieJar, CookieOptions, CookieStore, SameSite};
#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;
#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageStore;
pub use memory::MemoryStore;

use serde::{Serialize, de::DeserializeOwned};

use crate::CoreResult;

/// One write in an atomic batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp<'a> {
    Set(&'a str, &'a str),
    Remove(&'a str),
}

/// Named string attributes with durable, synchronous access
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> CoreResult<()>;

    fn remove(&self, key: &str) -> CoreResult<()>;

    /// Remove every entry visible to this store
    fn clear(&self) -> CoreResult<()>;

    fn count(&self) -> usize;

    /// Apply `ops` so that no reader observes a partial batch.
    ///
    /// The default applies them one by one; stores that can do better
    /// override it.
    fn apply(&self, ops: &[StoreOp<'_>]) -> CoreResult<()> {
        for op in ops {
            match *op {
                StoreOp::Set(key, value) => self.set(key, value)?,
                StoreOp::Remove(key) => self.remove(key)?,
            }
        }
        Ok(())
    }

    /// Store `value` if present. A missing value is logged and ignored.
    fn set_opt(&self, key: &str, value: Option<&str>) -> CoreResult<()> {
        match value {
            Some(value) => self.set(key, value),
            None => {
                tracing::warn!(key, "ignoring write of missing value");
                Ok(())
            }
        }
    }
}

/// JSON object helpers available on every store.
///
/// Serialization failures are logged and degrade to a skipped write or a
/// `None` read; they never propagate.
pub trait KeyValueStoreExt: KeyValueStore {
    /// Returns whether the value was written
    fn set_object<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize object");
                return false;
            }
        };
        match self.set(key, &json) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to store object");
                false
            }
        }
    }

    fn get_object<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "stored value is not a valid object");
                None
            }
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every store must share

    use super::*;
    use serde_json::json;

    pub fn run_all(store: &dyn KeyValueStore) {
        set_get_remove(store);
        missing_value_is_ignored(store);
        batch_is_applied(store);
        clear_empties_everything(store);
        object_round_trip(store);
    }

    fn set_get_remove(store: &dyn KeyValueStore) {
        store.set("access_token", "abc").unwrap();
        assert_eq!(store.get("access_token").as_deref(), Some("abc"));
        store.set("access_token", "def").unwrap();
        assert_eq!(store.get("access_token").as_deref(), Some("def"));
        store.remove("access_token").unwrap();
        assert_eq!(store.get("access_token"), None);
        store.remove("never-set").unwrap();
    }

    fn missing_value_is_ignored(store: &dyn KeyValueStore) {
        let before = store.count();
        store.set_opt("username", None).unwrap();
        assert_eq!(store.get("username"), None);
        assert_eq!(store.count(), before);
    }

    fn batch_is_applied(store: &dyn KeyValueStore) {
        store.set("jti", "old").unwrap();
        store
            .apply(&[
                StoreOp::Set("access_token", "t1"),
                StoreOp::Set("exp", "100"),
                StoreOp::Remove("jti"),
            ])
            .unwrap();
        assert_eq!(store.get("access_token").as_deref(), Some("t1"));
        assert_eq!(store.get("exp").as_deref(), Some("100"));
        assert_eq!(store.get("jti"), None);
    }

    fn clear_empties_everything(store: &dyn KeyValueStore) {
        for key in ["access_token", "refresh_token", "device_id", "username", "rol"] {
            store.set(key, "value").unwrap();
        }
        assert!(store.count() >= 5);
        store.clear().unwrap();
        assert_eq!(store.count(), 0);
        for key in ["access_token", "refresh_token", "device_id", "username", "rol"] {
            assert_eq!(store.get(key), None);
        }
    }

    fn object_round_trip(store: &dyn KeyValueStore) {
        assert!(store.set_object("obj", &json!({"a": 1})));
        let back: serde_json::Value = store.get_object("obj").unwrap();
        assert_eq!(back, json!({"a": 1}));

        store.set("text", "not json at all").unwrap();
        assert_eq!(store.get_object::<serde_json::Value>("text"), None);
        assert_eq!(store.get_object::<serde_json::Value>("absent"), None);
        store.clear().unwrap();
    }
}
