//! Push subscription identity reconciliation.

use crate::api::ApiResolver;
use crate::context::WorkerContext;
use crate::deferral::{DeferOutcome, DeferralEngine};
use crate::error::{SyncError, SyncResult};
use crate::network::rehydrate;
use crate::synchronizer::{EXISTING_ID_PROPERTY, NEW_ID_PROPERTY};
use deferq_protocol::{classifier, Method, Operation, Payload, RequestEnvelope};
use serde_json::json;
use tracing::{info, warn};

/// How a reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing was stored yet; the identifier was stored without a network call.
    Stored,
    /// The stored identifier already matched.
    Unchanged,
    /// The server accepted the rotation and the new identifier was stored.
    Rotated,
    /// The server refused the rotation; it was deferred for replay.
    Deferred(DeferOutcome),
}

/// Keeps the stored subscription identifier consistent with the server.
///
/// A network fault propagates and defers nothing. A refusal from the
/// server defers an `updateSubscription` request that the synchronizer
/// replays later with a fresh token.
pub struct SubscriptionReconciler {
    ctx: WorkerContext,
}

impl SubscriptionReconciler {
    /// Creates a reconciler.
    pub fn new(ctx: &WorkerContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Reconciles the stored identifier with `new_id`.
    pub async fn reconcile(&self, new_id: &str) -> SyncResult<ReconcileOutcome> {
        let subscriptions = self.ctx.subscriptions();

        let existing = match subscriptions.get().await? {
            None => {
                subscriptions.set(new_id).await?;
                self.ctx.listener.subscription_changed(None, new_id).await?;
                info!(new_id, "subscription identifier stored");
                return Ok(ReconcileOutcome::Stored);
            }
            Some(existing) if existing == new_id => return Ok(ReconcileOutcome::Unchanged),
            Some(existing) => existing,
        };

        let envelope = rotation(&existing, new_id);
        match self.rotate(&envelope).await {
            Ok(()) => {
                subscriptions.set(new_id).await?;
                self.ctx
                    .listener
                    .subscription_changed(Some(&existing), new_id)
                    .await?;
                info!(existing = %existing, new_id, "subscription identifier rotated");
                Ok(ReconcileOutcome::Rotated)
            }
            Err(SyncError::Rejected { status }) => {
                warn!(status, existing = %existing, new_id, "rotation refused, deferring");
                let target = self.ctx.config.push_target.clone();
                let outcome = DeferralEngine::new(&self.ctx).defer(&target, envelope).await?;
                Ok(ReconcileOutcome::Deferred(outcome))
            }
            Err(e) => Err(e),
        }
    }

    async fn rotate(&self, envelope: &RequestEnvelope) -> SyncResult<()> {
        let api = ApiResolver::new(&self.ctx)
            .resolve(&self.ctx.config.push_target)
            .await?;
        let request = rehydrate(&envelope.payload, &api, &self.ctx.config)?;
        let response = self.ctx.network.send(request).await?;
        if self.ctx.config.success.accepts(&response) {
            Ok(())
        } else {
            Err(SyncError::Rejected {
                status: response.status,
            })
        }
    }
}

fn rotation(existing: &str, new_id: &str) -> RequestEnvelope {
    let body = json!({
        EXISTING_ID_PROPERTY: existing,
        NEW_ID_PROPERTY: new_id,
    });
    classifier::push(Payload::json(Method::Put, body), Operation::UpdateSubscription)
}
