//! Platform capabilities consumed by the engine.
//!
//! Each capability is a trait so a worker can be assembled from real
//! platform bindings or from the in-process doubles defined here.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use deferq_protocol::{QueuedRequest, SyncTag, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// One-off retry triggers ("background sync").
#[async_trait]
pub trait RetryTrigger: Send + Sync {
    /// Returns true if the platform can fire triggers at all.
    fn is_supported(&self) -> bool;

    /// Asks the platform to fire `tag` once connectivity returns.
    async fn register(&self, tag: &SyncTag) -> SyncResult<()>;
}

/// A platform without retry triggers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetryTrigger;

#[async_trait]
impl RetryTrigger for NoRetryTrigger {
    fn is_supported(&self) -> bool {
        false
    }

    async fn register(&self, tag: &SyncTag) -> SyncResult<()> {
        Err(SyncError::Trigger(format!("retry triggers unsupported ({tag})")))
    }
}

/// A retry trigger that records registrations.
#[derive(Debug)]
pub struct MockRetryTrigger {
    supported: bool,
    refuse: AtomicBool,
    registered: Mutex<Vec<SyncTag>>,
}

impl MockRetryTrigger {
    /// Creates a supported trigger.
    pub fn new() -> Self {
        Self {
            supported: true,
            refuse: AtomicBool::new(false),
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Creates a trigger whose registrations always fail.
    pub fn refusing() -> Self {
        let trigger = Self::new();
        trigger.refuse.store(true, Ordering::SeqCst);
        trigger
    }

    /// Returns every tag registered so far.
    pub fn registered(&self) -> Vec<SyncTag> {
        self.registered.lock().clone()
    }
}

impl Default for MockRetryTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryTrigger for MockRetryTrigger {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn register(&self, tag: &SyncTag) -> SyncResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Trigger("registration refused".into()));
        }
        self.registered.lock().push(tag.clone());
        Ok(())
    }
}

/// Push-messaging capability of the platform.
#[async_trait]
pub trait PushCapability: Send + Sync {
    /// Returns true if a live push subscription exists.
    async fn has_subscription(&self) -> SyncResult<bool>;
}

/// A push capability with a settable answer.
#[derive(Debug, Default)]
pub struct FixedPushCapability {
    subscribed: AtomicBool,
    queries: AtomicU64,
}

impl FixedPushCapability {
    /// Creates a capability answering `subscribed`.
    pub fn new(subscribed: bool) -> Self {
        Self {
            subscribed: AtomicBool::new(subscribed),
            queries: AtomicU64::new(0),
        }
    }

    /// Changes the answer.
    pub fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::SeqCst);
    }

    /// Returns how many times the capability was queried.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushCapability for FixedPushCapability {
    async fn has_subscription(&self) -> SyncResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.subscribed.load(Ordering::SeqCst))
    }
}

/// Source of deferral timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time. Successive calls never repeat a value.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, bumped by one millisecond when two calls land in the
/// same millisecond.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp(next),
                Err(actual) => last = actual,
            }
        }
    }
}

/// A clock that starts at a fixed time and advances one millisecond per call.
#[derive(Debug)]
pub struct ManualClock {
    next: AtomicU64,
}

impl ManualClock {
    /// Creates a clock whose first reading is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Moves the clock to `millis`.
    pub fn set(&self, millis: u64) {
        self.next.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Extension point for requests the engine gave up on.
#[async_trait]
pub trait AbandonHook: Send + Sync {
    /// Called once, before the abandoned entry is deleted.
    async fn abandoned(&self, request: &QueuedRequest);
}

/// Does nothing with abandoned requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAbandonHook;

#[async_trait]
impl AbandonHook for NoopAbandonHook {
    async fn abandoned(&self, _request: &QueuedRequest) {}
}

/// Collaborator tracking state that depends on the push subscription id.
#[async_trait]
pub trait SubscriptionListener: Send + Sync {
    /// Called after the stored identifier changed to `current`.
    async fn subscription_changed(&self, previous: Option<&str>, current: &str) -> SyncResult<()>;
}

/// Ignores subscription changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscriptionListener;

#[async_trait]
impl SubscriptionListener for NoopSubscriptionListener {
    async fn subscription_changed(&self, _previous: Option<&str>, _current: &str) -> SyncResult<()> {
        Ok(())
    }
}
