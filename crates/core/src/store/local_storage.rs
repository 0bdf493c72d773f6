use gloo::storage::{LocalStorage, Storage};

use super::KeyValueStore;
use crate::{CoreError, CoreResult};

/// Browser `localStorage`; survives tab close
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

impl LocalStorageStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn storage_error(err: &impl std::fmt::Debug) -> CoreError {
    CoreError::storage_unavailable(format!("{err:?}"))
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        LocalStorage::raw().get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        LocalStorage::raw()
            .set_item(key, value)
            .map_err(|e| storage_error(&e))
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        LocalStorage::raw()
            .remove_item(key)
            .map_err(|e| storage_error(&e))
    }

    fn clear(&self) -> CoreResult<()> {
        LocalStorage::raw().clear().map_err(|e| storage_error(&e))
    }

    fn count(&self) -> usize {
        LocalStorage::raw().length().map_or(0, |n| n as usize)
    }
}
