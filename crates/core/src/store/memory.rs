use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{KeyValueStore, StoreOp};
use crate::CoreResult;

/// Process-local store; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn apply(&self, ops: &[StoreOp<'_>]) -> CoreResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for op in ops {
            match *op {
                StoreOp::Set(key, value) => {
                    entries.insert(key.to_string(), value.to_string());
                }
                StoreOp::Remove(key) => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
