//! Raw session storage backends.
//!
//! A [`SessionStorage`] is a flat string key/value map that lives as long as
//! the browsing session. [`FileSessionStorage`] additionally survives a
//! process restart.

use crate::errors::CheckpointError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Protocol for session-scoped string storage.
///
/// `set` must be atomic: a concurrent or subsequent `get` observes either the
/// previous value or the new one, never a partial write.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Gets a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError>;

    /// Sets a value.
    async fn set(&self, key: &str, value: String) -> Result<(), CheckpointError>;

    /// Removes a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CheckpointError>;

    /// Removes several values in one write.
    async fn remove_many(&self, keys: &[String]) -> Result<(), CheckpointError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Process-lifetime storage.
///
/// Clones share the same map, which is how tests model a restart that keeps
/// the session storage alive.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySessionStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns all keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Writes a raw value, bypassing typed access. Used to plant corrupt data.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(key.into(), value.into());
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CheckpointError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CheckpointError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), CheckpointError> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Storage persisted as a single JSON document.
///
/// Every mutation rewrites the document to a temporary sibling file and
/// renames it over the original, so a crash leaves either the old or the new
/// document on disk.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    // Serialises copy + write + commit so no mutation is lost and documents
    // land on disk in mutation order.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSessionStorage {
    /// Opens the storage, loading the existing document if there is one.
    ///
    /// An unreadable document is logged and replaced by an empty map on the
    /// next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(entries) => {
                    debug!(path = %path.display(), entries = entries.len(), "Loaded session storage");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable session storage");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `apply` to a copy of the entries and makes the copy visible
    /// only once it is on disk. A failed write leaves reads unchanged.
    async fn mutate<F>(&self, apply: F) -> Result<(), CheckpointError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self.write_lock.lock().await;
        let mut next = self.entries.lock().clone();
        apply(&mut next);
        let document = serde_json::to_string(&next)?;
        self.persist(&document).await?;
        *self.entries.lock() = next;
        Ok(())
    }

    async fn persist(&self, document: &str) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, document).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CheckpointError> {
        let key = key.to_string();
        self.mutate(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), CheckpointError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
        .await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), CheckpointError> {
        self.mutate(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_set_get_remove() {
        let storage = InMemorySessionStorage::new();
        storage.set("a", "1".to_string()).await.unwrap();
        storage.set("b", "2".to_string()).await.unwrap();
        assert_eq!(storage.get("a").await.unwrap().as_deref(), Some("1"));

        storage.remove("a").await.unwrap();
        storage.remove("missing").await.unwrap();
        assert!(storage.get("a").await.unwrap().is_none());
        assert_eq!(storage.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_in_memory_clones_share_entries() {
        let storage = InMemorySessionStorage::new();
        let restarted = storage.clone();
        storage.set("k", "v".to_string()).await.unwrap();
        assert_eq!(restarted.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let storage = FileSessionStorage::open(&path).await.unwrap();
            storage.set("s:checkpoint:generate", "{}".to_string()).await.unwrap();
            storage.set("s:processed", "x".to_string()).await.unwrap();
            storage.remove("s:processed").await.unwrap();
        }

        let reopened = FileSessionStorage::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("s:checkpoint:generate").await.unwrap().as_deref(),
            Some("{}")
        );
        assert!(reopened.get("s:processed").await.unwrap().is_none());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_storage_discards_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileSessionStorage::open(&path).await.unwrap();
        assert!(storage.get("anything").await.unwrap().is_none());

        storage.set("k", "v".to_string()).await.unwrap();
        let reopened = FileSessionStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_file_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let storage = FileSessionStorage::open(&path).await.unwrap();
        storage.remove_many(&["a".to_string()]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_reads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("nested");
        let path = parent.join("session.json");
        let storage = FileSessionStorage::open(&path).await.unwrap();
        storage.set("kept", "1".to_string()).await.unwrap();

        // A regular file where the directory was makes every write fail.
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "").unwrap();

        assert!(storage.set("lost", "2".to_string()).await.is_err());
        assert!(storage.remove("kept").await.is_err());
        assert!(storage.get("lost").await.unwrap().is_none());
        assert_eq!(storage.get("kept").await.unwrap().as_deref(), Some("1"));
    }
}
