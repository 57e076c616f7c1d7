//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store or key name cannot be used as an address.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected name.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}
