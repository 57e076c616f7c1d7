//! # deferq Protocol
//!
//! Queued request types, classification and serviceability policy for deferq.
//!
//! This crate provides:
//! - [`QueuedRequest`], the durable record of one deferred mutation
//! - [`Fallback`] classification and the [`classifier`] that produces it
//! - The pure selection rules of the serviceability [`policy`]
//! - Retry-trigger tags ([`SyncTag`]) and worker [`Command`]s
//! - CBOR encoding for stored records
//!
//! This is a pure crate with no I/O operations. Everything that touches
//! the store or the network lives in `deferq_sync`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
pub mod classifier;
mod command;
mod error;
pub mod policy;
mod request;
mod tag;

pub use api::{ApiInfo, ApiInfoMap, AuthContext};
pub use command::{Command, CommandReply};
pub use error::{ProtocolError, ProtocolResult};
pub use request::{
    BodyType, Fallback, Method, Operation, Payload, QueuedRequest, RequestEnvelope, RequestKind,
    Timestamp,
};
pub use tag::{SyncTag, TagClass};
