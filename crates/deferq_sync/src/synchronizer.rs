//! Replay of the deferred request queue.
//!
//! One pass runs the three-stage pipeline:
//! 1. read every entry and select the serviceable subset
//! 2. delete the losers
//! 3. replay each serviceable entry concurrently and join
//!
//! There is no lock over the store. Every write is either a delete, which
//! is idempotent, or a read-modify-write of one entry's own failure count.

use crate::context::WorkerContext;
use crate::error::{SyncError, SyncResult};
use crate::network::rehydrate;
use crate::policy;
use deferq_protocol::{
    ApiInfo, ApiInfoMap, Fallback, Operation, Payload, QueuedRequest, RequestKind, Timestamp,
};
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Body property of an `updateSubscription` request holding the old identifier.
pub const EXISTING_ID_PROPERTY: &str = "existingId";

/// Body property of an `updateSubscription` request holding the new identifier.
pub const NEW_ID_PROPERTY: &str = "newId";

/// Options of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Leave failed entries untouched and propagate the failure instead of
    /// counting it.
    pub no_manage: bool,
    /// Replay only entries for this target. Others stay queued.
    pub target: Option<String>,
}

impl ServiceOptions {
    /// Failures are counted and entries abandoned at the limit.
    pub fn managed() -> Self {
        Self::default()
    }

    /// Failures propagate; no bookkeeping.
    pub fn unmanaged() -> Self {
        Self {
            no_manage: true,
            target: None,
        }
    }

    /// Restricts the pass to `target`.
    pub fn for_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn replays(&self, entry: &QueuedRequest) -> bool {
        self.target.as_deref().map_or(true, |t| t == entry.target)
    }
}

/// What happened to one serviceable entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    /// Replayed successfully and deleted.
    Delivered(Timestamp),
    /// Replay failed; the entry stays queued.
    Retained {
        /// Entry key.
        timestamp: Timestamp,
        /// Failed attempts after this one.
        failure_count: u32,
    },
    /// Replay failed for the last time; the entry was deleted.
    Abandoned(QueuedRequest),
    /// Replay failed, but the entry had already been removed by another pass.
    Superseded(Timestamp),
}

impl ServiceOutcome {
    /// Timestamp of the entry this outcome is about.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ServiceOutcome::Delivered(ts) | ServiceOutcome::Superseded(ts) => *ts,
            ServiceOutcome::Retained { timestamp, .. } => *timestamp,
            ServiceOutcome::Abandoned(entry) => entry.timestamp,
        }
    }
}

/// Drains the serviceable subset of the queue over the network.
pub struct Synchronizer {
    ctx: WorkerContext,
}

impl Synchronizer {
    /// Creates a synchronizer.
    pub fn new(ctx: &WorkerContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Runs one replay pass.
    ///
    /// Every replayed entry must have api info in `apis`; a missing target
    /// fails the pass before anything is sent. Every replay runs to
    /// completion before the pass rejects with the first error among them.
    pub async fn service_all(
        &self,
        apis: &ApiInfoMap,
        options: ServiceOptions,
    ) -> SyncResult<Vec<ServiceOutcome>> {
        let queue = self.ctx.queue();
        let all = queue.all().await?;
        if all.is_empty() {
            debug!("request queue empty");
            return Ok(Vec::new());
        }

        let selected =
            policy::serviceable(&all, self.ctx.push.as_ref(), &self.ctx.config.topic_property)
                .await?;
        policy::prune_requests(&queue, &all, &selected).await?;

        let mut batch: Vec<(QueuedRequest, &ApiInfo)> = Vec::with_capacity(selected.len());
        for entry in selected.into_iter().filter(|e| options.replays(e)) {
            let api = apis
                .get(&entry.target)
                .ok_or_else(|| SyncError::UnknownTarget(entry.target.clone()))?;
            batch.push((entry, api));
        }

        info!(
            queued = all.len(),
            replaying = batch.len(),
            managed = !options.no_manage,
            "replaying deferred requests"
        );

        join_all(
            batch
                .into_iter()
                .map(|(entry, api)| self.service_one(entry, api, &options)),
        )
        .await
        .into_iter()
        .collect()
    }

    /// Replays one entry.
    ///
    /// An entry whose body cannot be encoded is never sendable; a managed
    /// pass abandons it without a network attempt.
    pub async fn service_one(
        &self,
        entry: QueuedRequest,
        api: &ApiInfo,
        options: &ServiceOptions,
    ) -> SyncResult<ServiceOutcome> {
        let request = match rehydrate(&entry.payload, api, &self.ctx.config) {
            Ok(request) => request,
            Err(e) if options.no_manage => return Err(e),
            Err(e) => return self.abandon_unsendable(entry.timestamp, &e).await,
        };
        let attempt = match self.ctx.network.send(request).await {
            Ok(response) if self.ctx.config.success.accepts(&response) => Ok(()),
            Ok(response) => Err(SyncError::Rejected {
                status: response.status,
            }),
            Err(e) => Err(e),
        };

        match attempt {
            Ok(()) => {
                self.ctx.queue().delete(entry.timestamp).await?;
                settle_success(&self.ctx, &entry.fallback, &entry.payload).await?;
                debug!(timestamp = %entry.timestamp, api = %entry.target, "replay delivered");
                Ok(ServiceOutcome::Delivered(entry.timestamp))
            }
            Err(e) if options.no_manage => {
                debug!(timestamp = %entry.timestamp, error = %e, "replay failed");
                Err(e)
            }
            Err(e) => self.record_failure(entry.timestamp, &e).await,
        }
    }

    async fn record_failure(
        &self,
        timestamp: Timestamp,
        error: &SyncError,
    ) -> SyncResult<ServiceOutcome> {
        let queue = self.ctx.queue();
        let Some(mut current) = queue.get(timestamp).await? else {
            debug!(%timestamp, "failed entry already removed");
            return Ok(ServiceOutcome::Superseded(timestamp));
        };

        let failures = current.failure_count.saturating_add(1);
        if failures >= self.ctx.config.max_failures {
            return self.abandon(current, error).await;
        }

        current.failure_count = failures;
        queue.update(&current).await?;
        debug!(%timestamp, failures, error = %error, "replay failed, retained");
        Ok(ServiceOutcome::Retained {
            timestamp,
            failure_count: failures,
        })
    }

    async fn abandon_unsendable(
        &self,
        timestamp: Timestamp,
        error: &SyncError,
    ) -> SyncResult<ServiceOutcome> {
        match self.ctx.queue().get(timestamp).await? {
            Some(current) => self.abandon(current, error).await,
            None => Ok(ServiceOutcome::Superseded(timestamp)),
        }
    }

    async fn abandon(
        &self,
        current: QueuedRequest,
        error: &SyncError,
    ) -> SyncResult<ServiceOutcome> {
        warn!(
            timestamp = %current.timestamp,
            api = %current.target,
            failures = current.failure_count,
            error = %error,
            "abandoning deferred request"
        );
        self.ctx.abandon.abandoned(&current).await;
        self.ctx.queue().delete(current.timestamp).await?;
        Ok(ServiceOutcome::Abandoned(current))
    }
}

/// Side effects of one successful request, replayed or live.
///
/// Prunes the entries the success made moot and keeps the stored
/// subscription identifier in step with the server.
pub(crate) async fn settle_success(
    ctx: &WorkerContext,
    fallback: &Fallback,
    payload: &Payload,
) -> SyncResult<()> {
    let queue = ctx.queue();
    let all = queue.all().await?;
    policy::prune_requests_by_policy(&queue, &all, fallback, payload, &ctx.config.topic_property)
        .await?;

    if fallback.kind != RequestKind::Push {
        return Ok(());
    }
    match fallback.operation {
        Operation::UpdateSubscription => {
            if let Some(new_id) = payload.property(NEW_ID_PROPERTY) {
                let previous = payload.property(EXISTING_ID_PROPERTY);
                ctx.subscriptions().set(new_id).await?;
                ctx.listener.subscription_changed(previous, new_id).await?;
                info!(new_id, "subscription identifier migrated");
            }
        }
        Operation::Unsubscribe => {
            ctx.subscriptions().clear().await?;
            debug!("subscription identifier cleared");
        }
        _ => {}
    }
    Ok(())
}
