//! # deferq sync engine
//!
//! Offline-first replay of client mutations.
//!
//! This crate provides:
//! - Deferral of mutations that could not reach the server
//! - Latest-wins selection and pruning of the deferred queue
//! - Replay with failure counting and abandonment
//! - Push subscription identity reconciliation
//! - A cache/network race for content endpoints
//! - Worker entry points for messages, retry triggers and restarts
//!
//! ## Architecture
//!
//! Every replay pass is a three-stage pipeline:
//! 1. Read every queued entry and select the serviceable subset
//! 2. Delete the entries that lost
//! 3. Replay the rest concurrently, deleting on success
//!
//! A successful request also deletes the queued entries it made moot.
//!
//! ## Key Invariants
//!
//! - At most one serviceable entry per logical entity
//! - Deferral only ever adds entries under a fresh timestamp
//! - The only in-place update is an entry's own failure count
//! - Deletes are idempotent, so concurrent passes are safe without locks
//! - Storage errors always propagate

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod context;
mod deferral;
mod error;
mod freshness;
mod network;
mod platform;
pub mod policy;
mod queue;
mod reconciler;
mod synchronizer;
mod worker;

pub use api::ApiResolver;
pub use config::{SyncConfig, MAX_FAILURES};
pub use context::WorkerContext;
pub use deferral::{DeferOutcome, DeferralEngine};
pub use error::{SyncError, SyncResult};
pub use freshness::{
    material_change, ContentCache, ContentChanged, FreshnessRace, MemoryContentCache,
    RaceOutcome, Source,
};
pub use network::{
    rehydrate, MockNetwork, MockReply, Network, NetworkRequest, NetworkResponse,
    SuccessPredicate,
};
pub use platform::{
    AbandonHook, Clock, FixedPushCapability, ManualClock, MockRetryTrigger, NoRetryTrigger,
    NoopAbandonHook, NoopSubscriptionListener, PushCapability, RetryTrigger,
    SubscriptionListener, SystemClock,
};
pub use queue::{InitDataStore, RequestQueue, SubscriptionStore};
pub use reconciler::{ReconcileOutcome, SubscriptionReconciler};
pub use synchronizer::{
    ServiceOptions, ServiceOutcome, Synchronizer, EXISTING_ID_PROPERTY, NEW_ID_PROPERTY,
};
pub use worker::{SendOutcome, Worker};
