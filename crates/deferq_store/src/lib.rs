//! # deferq Store
//!
//! Key-value store contract and backends for deferq.
//!
//! This crate is the lowest-level persistence layer. Stores are **opaque
//! byte stores** addressed by `(store, key)`. They do not interpret the
//! values they hold.
//!
//! ## Design Principles
//!
//! - Four key-scoped operations only: get, put, delete, list-all
//! - No transactions and no compare-and-swap
//! - Deleting a missing key succeeds
//! - Must be `Send + Sync`; several tasks may use one store concurrently
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral workers
//! - [`FileStore`] - One file per key, written atomically
//!
//! ## Example
//!
//! ```rust
//! use deferq_store::{InMemoryStore, KeyValueStore};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let store = InMemoryStore::new();
//!     store.put("requests", "1700000000000", b"payload".to_vec()).await.unwrap();
//!     let value = store.get("requests", "1700000000000").await.unwrap();
//!     assert_eq!(value.as_deref(), Some(&b"payload"[..]));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
