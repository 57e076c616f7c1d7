//! Error types for the sync engine.

use deferq_protocol::ProtocolError;
use deferq_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while deferring or replaying requests.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Storage failure. Never swallowed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A record, tag or body could not be encoded or parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No response was received.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a status the success predicate refused.
    #[error("server rejected request with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// A queued request names a target with no known api info.
    #[error("no api info for target {0:?}")]
    UnknownTarget(String),

    /// The platform refused a retry-trigger registration.
    #[error("retry trigger error: {0}")]
    Trigger(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if no response was received at all.
    pub fn is_network_fault(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Rejected { .. } => true,
            _ => false,
        }
    }
}
