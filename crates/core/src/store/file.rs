use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::{KeyValueStore, StoreOp};
use crate::{CoreError, CoreResult};

/// Persistent store backed by a JSON document on disk.
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so a crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A document that cannot be parsed is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable store");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Open `session.json` inside `dir`, creating the directory if needed
    pub fn in_dir(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Self::open(dir.join("session.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<F>(&self, f: F) -> CoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            CoreError::io_error(format!("failed to replace {}: {e}", self.path.display()))
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> CoreResult<()> {
        self.mutate(BTreeMap::clear)
    }

    fn count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn apply(&self, ops: &[StoreOp<'_>]) -> CoreResult<()> {
        self.mutate(|entries| {
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
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_store_conformance() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::in_dir(dir.path()).unwrap();
        super::super::conformance::run_all(&store);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::in_dir(dir.path()).unwrap();
            store.set("device_id", "d-123").unwrap();
            store.set("username", "ana").unwrap();
        }

        let reopened = FileStore::in_dir(dir.path()).unwrap();
        assert_eq!(reopened.get("device_id").as_deref(), Some("d-123"));
        assert_eq!(reopened.count(), 2);
    }

    #[test]
    fn corrupt_document_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.count(), 0);
        store.set("k", "v").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().get("k").as_deref(), Some("v"));
    }
}
