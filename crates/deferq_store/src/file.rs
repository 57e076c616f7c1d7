//! File-based store for persistent queues.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::StoreResult;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

/// A directory-backed key-value store.
///
/// Layout: `<root>/<store>/<key>`, one file per key. Values survive
/// process restarts.
///
/// # Durability
///
/// - `put` writes to a hidden temp file, syncs it, then renames it over
///   the key. A task reaped mid-write leaves either the old value or the
///   new one, never a torn value.
/// - Hidden files (leading dot) are never reported by `all`.
///
/// # Example
///
/// ```no_run
/// use deferq_store::{FileStore, KeyValueStore};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// runtime.block_on(async {
///     let store = FileStore::open("/var/lib/deferq").await.unwrap();
///     store.put("requests", "1700000000000", b"entry".to_vec()).await.unwrap();
/// });
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    next_temp: AtomicU64,
}

impl FileStore {
    /// Opens or creates a file store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            next_temp: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, store: &str) -> StoreResult<PathBuf> {
        validate_key(store)?;
        Ok(self.root.join(store))
    }

    fn key_path(&self, store: &str, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.store_dir(store)?.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, store: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.key_path(store, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let path = self.key_path(store, key)?;
        let dir = self.store_dir(store)?;
        fs::create_dir_all(&dir).await?;

        let n = self.next_temp.fetch_add(1, Ordering::Relaxed);
        let temp = dir.join(format!(".{key}.{n}.tmp"));

        fs::write(&temp, &value).await?;
        let file = fs::File::open(&temp).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(store, key, bytes = value.len(), "stored value");
        Ok(())
    }

    async fn delete(&self, store: &str, key: &str) -> StoreResult<()> {
        let path = self.key_path(store, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn all(&self, store: &str) -> StoreResult<Vec<Vec<u8>>> {
        let dir = self.store_dir(store)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await?.is_file() {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut values = Vec::with_capacity(names.len());
        for name in names {
            // A concurrent delete between listing and reading is not an error.
            match fs::read(dir.join(&name)).await {
                Ok(bytes) => values.push(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_put_then_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.put("requests", "1", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("requests", "1").await.unwrap(), Some(b"hello".to_vec()));
        assert!(dir.path().join("requests").join("1").exists());
    }

    #[tokio::test]
    async fn file_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("requests", "1").await.unwrap(), None);
        assert!(store.all("requests").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.put("state", "subscriptionId", b"abc".to_vec()).await.unwrap();
        }

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            assert_eq!(
                store.get("state", "subscriptionId").await.unwrap(),
                Some(b"abc".to_vec())
            );
        }
    }

    #[tokio::test]
    async fn file_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.put("requests", "1", b"x".to_vec()).await.unwrap();
        store.delete("requests", "1").await.unwrap();
        store.delete("requests", "1").await.unwrap();
        assert_eq!(store.get("requests", "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_all_is_key_ordered_and_skips_hidden() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.put("requests", "1700000000002", b"b".to_vec()).await.unwrap();
        store.put("requests", "1700000000001", b"a".to_vec()).await.unwrap();
        std::fs::write(dir.path().join("requests").join(".stale.tmp"), b"junk").unwrap();

        let values = store.all("requests").await.unwrap();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let result = store.put("requests", "../escape", vec![]).await;
        assert!(matches!(result, Err(StoreError::InvalidKey { .. })));
        let result = store.get("../etc", "passwd").await;
        assert!(matches!(result, Err(StoreError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn file_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("root");

        let store = FileStore::open(&root).await.unwrap();
        assert!(root.exists());
        assert_eq!(store.root(), root);
    }
}
