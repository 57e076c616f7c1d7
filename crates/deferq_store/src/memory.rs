//! In-memory store for testing.

use crate::backend::KeyValueStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Workers that do not need to survive a restart
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
///
/// # Example
///
/// ```rust
/// use deferq_store::{InMemoryStore, KeyValueStore};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// runtime.block_on(async {
///     let store = InMemoryStore::new();
///     store.put("state", "subscriptionId", b"abc".to_vec()).await.unwrap();
///     assert_eq!(store.len("state"), 1);
/// });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    stores: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys held in `store`.
    #[must_use]
    pub fn len(&self, store: &str) -> usize {
        self.stores.read().get(store).map_or(0, BTreeMap::len)
    }

    /// Returns true if `store` holds no keys.
    #[must_use]
    pub fn is_empty(&self, store: &str) -> bool {
        self.len(store) == 0
    }

    /// Returns the keys of `store` in ascending order.
    #[must_use]
    pub fn keys(&self, store: &str) -> Vec<String> {
        self.stores
            .read()
            .get(store)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Closes the store. Every later operation fails with [`StoreError::Closed`].
    ///
    /// Useful for exercising storage-fault paths.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, store: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self
            .stores
            .read()
            .get(store)
            .and_then(|s| s.get(key))
            .cloned())
    }

    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.check_open()?;
        self.stores
            .write()
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, store: &str, key: &str) -> StoreResult<()> {
        self.check_open()?;
        if let Some(s) = self.stores.write().get_mut(store) {
            s.remove(key);
        }
        Ok(())
    }

    async fn all(&self, store: &str) -> StoreResult<Vec<Vec<u8>>> {
        self.check_open()?;
        Ok(self
            .stores
            .read()
            .get(store)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }
}
