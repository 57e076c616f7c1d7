//! Cache/network race for content endpoints.
//!
//! The caller gets whichever source answers first. When the cache wins,
//! the network leg keeps running in the background; if its body differs
//! materially from the cached one, the cache is updated and a
//! [`ContentChanged`] is broadcast so a UI can offer a refresh.

use crate::context::WorkerContext;
use crate::error::{SyncError, SyncResult};
use crate::network::{Network, NetworkRequest, SuccessPredicate};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Cached content bodies keyed by request.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Returns the cached body for `key`.
    async fn lookup(&self, key: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Replaces the cached body for `key`.
    async fn store(&self, key: &str, body: Vec<u8>) -> SyncResult<()>;
}

/// An in-memory content cache.
#[derive(Debug, Default)]
pub struct MemoryContentCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentCache for MemoryContentCache {
    async fn lookup(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn store(&self, key: &str, body: Vec<u8>) -> SyncResult<()> {
        self.entries.write().insert(key.to_string(), body);
        Ok(())
    }
}

/// Broadcast when fresh content differs materially from what was served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChanged {
    /// Cache key.
    pub key: String,
    /// Length of the body served from cache.
    pub previous_len: usize,
    /// Length of the fresh body.
    pub current_len: usize,
}

/// Which leg answered the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The cache.
    Cache,
    /// The network.
    Network,
}

/// The body handed to the caller.
#[derive(Debug)]
pub struct RaceOutcome {
    /// Response body.
    pub body: Vec<u8>,
    /// Where it came from.
    pub source: Source,
    /// Background comparison still running after a cache answer.
    pub refresh: Option<JoinHandle<()>>,
}

/// Races a content cache against the network.
pub struct FreshnessRace {
    network: Arc<dyn Network>,
    cache: Arc<dyn ContentCache>,
    success: SuccessPredicate,
    threshold: f64,
    changes: broadcast::Sender<ContentChanged>,
}

impl FreshnessRace {
    /// Creates a race over `cache`.
    pub fn new(ctx: &WorkerContext, cache: Arc<dyn ContentCache>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            network: Arc::clone(&ctx.network),
            cache,
            success: ctx.config.success,
            threshold: ctx.config.freshness_threshold,
            changes,
        }
    }

    /// Subscribes to content-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ContentChanged> {
        self.changes.subscribe()
    }

    /// Fetches `request`, answering from whichever source is first.
    ///
    /// A network failure fails the race only when the cache has nothing.
    pub async fn fetch(&self, key: &str, request: NetworkRequest) -> SyncResult<RaceOutcome> {
        let network = Arc::clone(&self.network);
        let success = self.success;
        let mut live = tokio::spawn(async move { fetch_live(network.as_ref(), request, success).await });
        let mut cached = self.cache.lookup(key);

        tokio::select! {
            joined = &mut live => match flatten(joined) {
                Ok(body) => {
                    self.cache.store(key, body.clone()).await?;
                    Ok(RaceOutcome { body, source: Source::Network, refresh: None })
                }
                Err(e) => match cached.await {
                    Ok(Some(body)) => {
                        debug!(key, error = %e, "network failed, serving cached content");
                        Ok(RaceOutcome { body, source: Source::Cache, refresh: None })
                    }
                    _ => Err(e),
                },
            },
            lookup = &mut cached => match lookup {
                Ok(Some(body)) => {
                    let refresh = self.spawn_refresh(key.to_string(), body.clone(), live);
                    Ok(RaceOutcome { body, source: Source::Cache, refresh: Some(refresh) })
                }
                miss => {
                    if let Err(e) = miss {
                        warn!(key, error = %e, "content cache lookup failed");
                    }
                    let body = flatten(live.await)?;
                    self.cache.store(key, body.clone()).await?;
                    Ok(RaceOutcome { body, source: Source::Network, refresh: None })
                }
            },
        }
    }

    fn spawn_refresh(
        &self,
        key: String,
        previous: Vec<u8>,
        live: JoinHandle<SyncResult<Vec<u8>>>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let changes = self.changes.clone();
        let threshold = self.threshold;

        tokio::spawn(async move {
            let fresh = match flatten(live.await) {
                Ok(fresh) => fresh,
                Err(e) => {
                    debug!(key = %key, error = %e, "network leg failed after cache answered");
                    return;
                }
            };
            if !material_change(&previous, &fresh, threshold) {
                return;
            }
            let change = ContentChanged {
                key: key.clone(),
                previous_len: previous.len(),
                current_len: fresh.len(),
            };
            if let Err(e) = cache.store(&key, fresh).await {
                warn!(key = %key, error = %e, "failed to refresh content cache");
                return;
            }
            debug!(key = %key, "content changed");
            // No receivers is not an error.
            let _ = changes.send(change);
        })
    }
}

/// True when more than `ratio` of the larger body differs.
///
/// Differing bytes at the same offset and the length difference both count.
pub fn material_change(old: &[u8], new: &[u8], ratio: f64) -> bool {
    let max_len = old.len().max(new.len());
    if max_len == 0 {
        return false;
    }
    let differing = old.iter().zip(new).filter(|(a, b)| a != b).count()
        + old.len().abs_diff(new.len());
    differing as f64 > ratio * max_len as f64
}

async fn fetch_live(
    network: &dyn Network,
    request: NetworkRequest,
    success: SuccessPredicate,
) -> SyncResult<Vec<u8>> {
    let response = network.send(request).await?;
    if success.accepts(&response) {
        Ok(response.body)
    } else {
        Err(SyncError::Rejected {
            status: response.status,
        })
    }
}

fn flatten(joined: Result<SyncResult<Vec<u8>>, JoinError>) -> SyncResult<Vec<u8>> {
    joined.map_err(|e| SyncError::transport_fatal(format!("fetch task failed: {e}")))?
}
