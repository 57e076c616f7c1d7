//! Deferral of failed sends.

use crate::context::WorkerContext;
use crate::error::SyncResult;
use deferq_protocol::{QueuedRequest, RequestEnvelope, SyncTag, Timestamp};
use tracing::{info, warn};

/// What the caller of [`DeferralEngine::defer`] should tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferOutcome {
    /// Stored; it will be replayed later.
    Deferred(Timestamp),
    /// Stored, but nothing will replay it automatically. Report the failure now.
    Failed(Timestamp),
}

impl DeferOutcome {
    /// The HTTP-analogous status: 203 for deferred, 400 for failed.
    pub fn status(&self) -> u16 {
        match self {
            DeferOutcome::Deferred(_) => 203,
            DeferOutcome::Failed(_) => 400,
        }
    }

    /// Timestamp of the stored entry.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DeferOutcome::Deferred(ts) | DeferOutcome::Failed(ts) => *ts,
        }
    }

    /// Returns true if the request will be replayed.
    pub fn is_deferred(&self) -> bool {
        matches!(self, DeferOutcome::Deferred(_))
    }
}

/// Persists requests that could not be sent and asks for a retry trigger.
pub struct DeferralEngine {
    ctx: WorkerContext,
}

impl DeferralEngine {
    /// Creates a deferral engine.
    pub fn new(ctx: &WorkerContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Stores `envelope` for `target` under a fresh timestamp.
    ///
    /// Exactly one new entry is written. A body that cannot be encoded is
    /// refused before anything is stored. A failed trigger registration is
    /// logged and does not fail the deferral; a failed store write does.
    pub async fn defer(&self, target: &str, envelope: RequestEnvelope) -> SyncResult<DeferOutcome> {
        envelope.payload.encode_body()?;
        let timestamp = self.ctx.clock.now();
        let user_replayable = envelope.classification.user_replayable;
        let request = QueuedRequest::new(timestamp, target, envelope);

        self.ctx.queue().add(&request).await?;

        if self.ctx.trigger.is_supported() {
            let tag = SyncTag::deferred_requests(target);
            if let Err(e) = self.ctx.trigger.register(&tag).await {
                warn!(%tag, error = %e, "retry trigger registration failed; replay waits for restart");
            }
            info!(%timestamp, api = target, "request deferred");
            return Ok(DeferOutcome::Deferred(timestamp));
        }

        if !user_replayable {
            info!(%timestamp, api = target, "request stored but not replayable on this platform");
            return Ok(DeferOutcome::Failed(timestamp));
        }

        info!(%timestamp, api = target, "request deferred until restart");
        Ok(DeferOutcome::Deferred(timestamp))
    }
}
