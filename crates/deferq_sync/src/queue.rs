//! Typed adapters over the key-value store.
//!
//! Three stores are used:
//! - the request queue, keyed by timestamp
//! - scalar state (the push subscription identifier)
//! - init data seeded by the application (api map, store snapshot)
//!
//! Every method is a single key-scoped store operation, except
//! [`RequestQueue::delete_all`], which is a sequence of idempotent deletes.

use crate::error::SyncResult;
use deferq_protocol::{ApiInfoMap, QueuedRequest, Timestamp};
use deferq_store::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable queue of deferred requests.
#[derive(Clone)]
pub struct RequestQueue {
    store: Arc<dyn KeyValueStore>,
    name: String,
}

impl RequestQueue {
    /// Creates a queue over `store`'s partition `name`.
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Persists a new entry under its timestamp.
    pub async fn add(&self, request: &QueuedRequest) -> SyncResult<()> {
        self.store
            .put(&self.name, &request.key(), request.encode()?)
            .await?;
        debug!(
            timestamp = %request.timestamp,
            kind = %request.fallback.kind,
            operation = %request.fallback.operation,
            "queued request"
        );
        Ok(())
    }

    /// Writes back an existing entry.
    pub async fn update(&self, request: &QueuedRequest) -> SyncResult<()> {
        self.store
            .put(&self.name, &request.key(), request.encode()?)
            .await?;
        Ok(())
    }

    /// Reads one entry.
    pub async fn get(&self, timestamp: Timestamp) -> SyncResult<Option<QueuedRequest>> {
        match self.store.get(&self.name, &timestamp.key()).await? {
            Some(bytes) => Ok(Some(QueuedRequest::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes one entry. Removing a missing entry succeeds.
    pub async fn delete(&self, timestamp: Timestamp) -> SyncResult<()> {
        self.store.delete(&self.name, &timestamp.key()).await?;
        Ok(())
    }

    /// Removes several entries, returning how many deletes were issued.
    pub async fn delete_all(&self, timestamps: &[Timestamp]) -> SyncResult<usize> {
        for timestamp in timestamps {
            self.delete(*timestamp).await?;
        }
        Ok(timestamps.len())
    }

    /// Reads every entry in timestamp order.
    ///
    /// Entries that fail to decode are logged and skipped so one corrupt
    /// record cannot wedge the queue.
    pub async fn all(&self) -> SyncResult<Vec<QueuedRequest>> {
        let values = self.store.all(&self.name).await?;
        let mut entries: Vec<QueuedRequest> = values
            .iter()
            .filter_map(|bytes| match QueuedRequest::decode(bytes) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(store = %self.name, error = %e, "skipping undecodable queue entry");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

/// Stored push subscription identifier.
#[derive(Clone)]
pub struct SubscriptionStore {
    store: Arc<dyn KeyValueStore>,
    name: String,
}

impl SubscriptionStore {
    const KEY: &'static str = "subscriptionId";

    /// Creates an adapter over `store`'s partition `name`.
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Returns the last known identifier.
    pub async fn get(&self) -> SyncResult<Option<String>> {
        Ok(self
            .store
            .get(&self.name, Self::KEY)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Stores `id`.
    pub async fn set(&self, id: &str) -> SyncResult<()> {
        self.store
            .put(&self.name, Self::KEY, id.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Forgets the identifier.
    pub async fn clear(&self) -> SyncResult<()> {
        self.store.delete(&self.name, Self::KEY).await?;
        Ok(())
    }
}

/// Data seeded by the application through the `init` command.
#[derive(Clone)]
pub struct InitDataStore {
    store: Arc<dyn KeyValueStore>,
    name: String,
}

impl InitDataStore {
    const APIS: &'static str = "apis";
    const STORES: &'static str = "stores";
    const LAST_UPDATE: &'static str = "lastUpdate";

    /// Creates an adapter over `store`'s partition `name`.
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Replaces the seeded data.
    pub async fn save(
        &self,
        apis: &ApiInfoMap,
        stores: &serde_json::Value,
        timestamp: Timestamp,
    ) -> SyncResult<()> {
        self.put_json(Self::APIS, apis).await?;
        self.put_json(Self::STORES, stores).await?;
        self.put_json(Self::LAST_UPDATE, &timestamp).await?;
        Ok(())
    }

    /// Returns the cached api map; empty if never seeded.
    pub async fn apis(&self) -> SyncResult<ApiInfoMap> {
        Ok(self.get_json(Self::APIS).await?.unwrap_or_default())
    }

    /// Returns the cached store snapshot.
    pub async fn stores(&self) -> SyncResult<Option<serde_json::Value>> {
        self.get_json(Self::STORES).await
    }

    /// Returns when the data was last seeded.
    pub async fn last_update(&self) -> SyncResult<Option<Timestamp>> {
        self.get_json(Self::LAST_UPDATE).await
    }

    async fn put_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> SyncResult<()> {
        let bytes = serde_json::to_vec(value).map_err(deferq_protocol::ProtocolError::from)?;
        self.store.put(&self.name, key, bytes).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> SyncResult<Option<T>> {
        match self.store.get(&self.name, key).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(deferq_protocol::ProtocolError::from)?,
            )),
            None => Ok(None),
        }
    }
}
