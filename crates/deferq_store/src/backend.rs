//! Store contract definition.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;

/// A key-value store partitioned into named stores.
///
/// Values are **opaque bytes**. Callers own the encoding.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last `put` under the same key
/// - `delete` of a missing key is a no-op, not an error
/// - `all` returns values in ascending key order
/// - No operation spans more than one key; there are no transactions
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, store: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Removes the value stored under `key`.
    async fn delete(&self, store: &str, key: &str) -> StoreResult<()>;

    /// Returns every value in `store`, ordered by key.
    async fn all(&self, store: &str) -> StoreResult<Vec<Vec<u8>>>;
}

/// Checks that a store or key name is a safe, portable address.
///
/// Accepted names are non-empty, do not start with a dot and only
/// contain ASCII alphanumerics, `.`, `_` and `-`.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "empty"
    } else if key.starts_with('.') {
        "leading dot"
    } else if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        "unsupported character"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
