//! Serviceability policy applied to the store.
//!
//! Selection is delegated to [`deferq_protocol::policy`]; these wrappers
//! add the push-capability query and the deletes.

use crate::error::SyncResult;
use crate::platform::PushCapability;
use crate::queue::RequestQueue;
use deferq_protocol::policy::{
    moot_after_success, needs_subscription_check, select_serviceable, unserviceable,
};
use deferq_protocol::{Fallback, Payload, QueuedRequest};
use tracing::debug;

/// Computes the serviceable subset of `all`.
///
/// The push capability is queried only when topic updates could be
/// serviceable.
pub async fn serviceable(
    all: &[QueuedRequest],
    push: &dyn PushCapability,
    topic_property: &str,
) -> SyncResult<Vec<QueuedRequest>> {
    let live = if needs_subscription_check(all) {
        push.has_subscription().await?
    } else {
        false
    };
    Ok(select_serviceable(all, topic_property, live))
}

/// Deletes every entry of `all` that is not in `serviceable`.
///
/// Returns how many entries were deleted.
pub async fn prune_requests(
    queue: &RequestQueue,
    all: &[QueuedRequest],
    serviceable: &[QueuedRequest],
) -> SyncResult<usize> {
    let losers = unserviceable(all, serviceable);
    if !losers.is_empty() {
        debug!(count = losers.len(), "pruning unserviceable requests");
    }
    queue.delete_all(&losers).await
}

/// Deletes the entries made moot by one successful request.
///
/// A request type without a policy prunes nothing.
pub async fn prune_requests_by_policy(
    queue: &RequestQueue,
    all: &[QueuedRequest],
    success: &Fallback,
    body: &Payload,
    topic_property: &str,
) -> SyncResult<usize> {
    match moot_after_success(all, success, body, topic_property) {
        Some(moot) => {
            debug!(
                kind = %success.kind,
                operation = %success.operation,
                count = moot.len(),
                "pruning requests made moot"
            );
            queue.delete_all(&moot).await
        }
        None => {
            debug!(kind = %success.kind, "no prune policy for request type");
            Ok(0)
        }
    }
}
