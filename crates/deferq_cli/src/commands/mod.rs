//! CLI command implementations.

pub mod inspect;
pub mod prune;
pub mod serviceable;
pub mod subscription;

use deferq_protocol::QueuedRequest;
use deferq_store::{FileStore, KeyValueStore};
use deferq_sync::{InitDataStore, RequestQueue, SubscriptionStore, SyncConfig};
use std::sync::Arc;

/// Result of a command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Typed views over a file store with the default store names.
pub struct Stores {
    /// Deferred requests.
    pub queue: RequestQueue,
    /// Push subscription identifier.
    pub subscriptions: SubscriptionStore,
    /// Application-seeded data.
    pub init: InitDataStore,
}

impl Stores {
    /// Wraps `store`.
    pub fn new(store: FileStore) -> Self {
        let config = SyncConfig::default();
        let store: Arc<dyn KeyValueStore> = Arc::new(store);
        Self {
            queue: RequestQueue::new(Arc::clone(&store), config.request_store),
            subscriptions: SubscriptionStore::new(Arc::clone(&store), config.state_store),
            init: InitDataStore::new(store, config.init_store),
        }
    }
}

/// One line describing a queued request.
pub fn describe(entry: &QueuedRequest) -> String {
    format!(
        "{:>15}  {:<8} {:<18} {:<6} {:<20} {}  failures={}",
        entry.timestamp.to_string(),
        entry.fallback.kind.as_str(),
        entry.fallback.operation.as_str(),
        entry.payload.method.as_str(),
        entry.fallback.key.as_deref().unwrap_or("-"),
        entry.target,
        entry.failure_count,
    )
}
