//! Worker-scoped dependencies.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::network::Network;
use crate::platform::{
    AbandonHook, Clock, NoRetryTrigger, NoopAbandonHook, NoopSubscriptionListener,
    PushCapability, RetryTrigger, SubscriptionListener, SystemClock,
};
use crate::queue::{InitDataStore, RequestQueue, SubscriptionStore};
use async_trait::async_trait;
use deferq_store::KeyValueStore;
use std::sync::Arc;

/// Everything a component needs, created once per worker instance.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct WorkerContext {
    /// Engine configuration.
    pub config: Arc<SyncConfig>,
    /// Persistent store.
    pub store: Arc<dyn KeyValueStore>,
    /// Network used for replays.
    pub network: Arc<dyn Network>,
    /// Retry-trigger registration.
    pub trigger: Arc<dyn RetryTrigger>,
    /// Push-subscription queries.
    pub push: Arc<dyn PushCapability>,
    /// Deferral timestamps.
    pub clock: Arc<dyn Clock>,
    /// What happens to abandoned requests.
    pub abandon: Arc<dyn AbandonHook>,
    /// Notified when the subscription identifier changes.
    pub listener: Arc<dyn SubscriptionListener>,
}

impl WorkerContext {
    /// Creates a context with no retry triggers, no push subscription,
    /// the system clock and no-op hooks.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            network,
            trigger: Arc::new(NoRetryTrigger),
            push: Arc::new(NotSubscribed),
            clock: Arc::new(SystemClock::new()),
            abandon: Arc::new(NoopAbandonHook),
            listener: Arc::new(NoopSubscriptionListener),
        }
    }

    /// Sets the retry trigger.
    pub fn with_trigger(mut self, trigger: Arc<dyn RetryTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the push capability.
    pub fn with_push(mut self, push: Arc<dyn PushCapability>) -> Self {
        self.push = push;
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the abandonment hook.
    pub fn with_abandon_hook(mut self, hook: Arc<dyn AbandonHook>) -> Self {
        self.abandon = hook;
        self
    }

    /// Sets the subscription listener.
    pub fn with_listener(mut self, listener: Arc<dyn SubscriptionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// The deferred request queue.
    pub fn queue(&self) -> RequestQueue {
        RequestQueue::new(Arc::clone(&self.store), self.config.request_store.clone())
    }

    /// The stored subscription identifier.
    pub fn subscriptions(&self) -> SubscriptionStore {
        SubscriptionStore::new(Arc::clone(&self.store), self.config.state_store.clone())
    }

    /// The application-seeded init data.
    pub fn init_data(&self) -> InitDataStore {
        InitDataStore::new(Arc::clone(&self.store), self.config.init_store.clone())
    }
}

struct NotSubscribed;

#[async_trait]
impl PushCapability for NotSubscribed {
    async fn has_subscription(&self) -> SyncResult<bool> {
        Ok(false)
    }
}
