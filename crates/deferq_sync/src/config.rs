//! Configuration for the sync engine.

use crate::network::SuccessPredicate;

/// Replay attempts after which a queued request is abandoned.
pub const MAX_FAILURES: u32 = 3;

/// Configuration shared by every component of a worker.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed replays that abandon an entry.
    pub max_failures: u32,
    /// Body property naming the topic of an `updateTopics` request.
    pub topic_property: String,
    /// Store holding queued requests, keyed by timestamp.
    pub request_store: String,
    /// Store holding scalar state such as the subscription identifier.
    pub state_store: String,
    /// Store holding data seeded by the application.
    pub init_store: String,
    /// Endpoint answering with the current authentication context.
    pub whoami_endpoint: String,
    /// Header carrying the anti-forgery token.
    pub csrf_header: String,
    /// Target of push subscription requests.
    pub push_target: String,
    /// Fraction of a body that must change before listeners are notified.
    pub freshness_threshold: f64,
    /// Decides which responses count as delivered.
    pub success: SuccessPredicate,
}

impl SyncConfig {
    /// Creates a configuration with default store names and endpoints.
    pub fn new() -> Self {
        Self {
            max_failures: MAX_FAILURES,
            topic_property: deferq_protocol::policy::DEFAULT_TOPIC_PROPERTY.to_string(),
            request_store: "requests".into(),
            state_store: "state".into(),
            init_store: "init".into(),
            whoami_endpoint: "/api/whoami".into(),
            csrf_header: "X-CSRF-Token".into(),
            push_target: "/api/push".into(),
            freshness_threshold: 0.01,
            success: SuccessPredicate::default(),
        }
    }

    /// Sets the abandonment limit.
    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.max_failures = max.max(1);
        self
    }

    /// Sets the topic property.
    pub fn with_topic_property(mut self, property: impl Into<String>) -> Self {
        self.topic_property = property.into();
        self
    }

    /// Sets the whoami endpoint.
    pub fn with_whoami_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.whoami_endpoint = endpoint.into();
        self
    }

    /// Sets the anti-forgery header name.
    pub fn with_csrf_header(mut self, header: impl Into<String>) -> Self {
        self.csrf_header = header.into();
        self
    }

    /// Sets the push target.
    pub fn with_push_target(mut self, target: impl Into<String>) -> Self {
        self.push_target = target.into();
        self
    }

    /// Sets the freshness threshold, clamped to `0.0..=1.0`.
    pub fn with_freshness_threshold(mut self, threshold: f64) -> Self {
        self.freshness_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Sets the success predicate.
    pub fn with_success(mut self, success: SuccessPredicate) -> Self {
        self.success = success;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
