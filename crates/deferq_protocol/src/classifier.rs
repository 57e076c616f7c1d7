//! Classification of outbound mutations.
//!
//! Every mutation that may be deferred is tagged once with a [`Fallback`]
//! descriptor. All later decisions (latest-wins filtering, pruning,
//! whether to surface a failure to the user) read the descriptor and
//! never look at the request again.
//!
//! Classification is deterministic and performs no I/O.

use crate::request::{Fallback, Operation, Payload, RequestEnvelope, RequestKind};

/// Grouping key shared by every push request.
///
/// Push requests are never differentiated by key; topic updates are
/// deduplicated by a body property instead.
pub const PUSH_KEY: &str = "push";

/// Grouping key for contact submissions that carry no reply address.
pub const ANONYMOUS_CONTACT_KEY: &str = "anonymous";

/// Body property holding the sender address of a contact submission.
pub const REPLY_TO_PROPERTY: &str = "replyTo";

/// Classifies a mutation.
///
/// `key` overrides the kind-specific default grouping key:
/// - contact: the body's `replyTo` address, else [`ANONYMOUS_CONTACT_KEY`]
/// - push: always [`PUSH_KEY`]
/// - unknown: no key
pub fn classify(
    kind: RequestKind,
    payload: &Payload,
    key: Option<&str>,
    operation: Operation,
) -> Fallback {
    let key = key
        .map(str::to_string)
        .or_else(|| default_key(&kind, payload));
    let user_replayable = user_replayable(&kind, &operation);

    Fallback {
        kind,
        operation,
        key,
        user_replayable,
    }
}

/// Classifies a contact submission and wraps it in an envelope.
pub fn contact(payload: Payload) -> RequestEnvelope {
    let classification = classify(RequestKind::Contact, &payload, None, Operation::Contact);
    RequestEnvelope::new(payload, classification)
}

/// Classifies a push request and wraps it in an envelope.
pub fn push(payload: Payload, operation: Operation) -> RequestEnvelope {
    let classification = classify(RequestKind::Push, &payload, None, operation);
    RequestEnvelope::new(payload, classification)
}

fn default_key(kind: &RequestKind, payload: &Payload) -> Option<String> {
    match kind {
        RequestKind::Contact => Some(
            payload
                .property(REPLY_TO_PROPERTY)
                .unwrap_or(ANONYMOUS_CONTACT_KEY)
                .to_string(),
        ),
        RequestKind::Push => Some(PUSH_KEY.to_string()),
        RequestKind::Unknown(_) => None,
    }
}

// Demo sends only make sense while the user is watching.
fn user_replayable(kind: &RequestKind, operation: &Operation) -> bool {
    match (kind, operation) {
        (RequestKind::Contact, Operation::Contact) => true,
        (
            RequestKind::Push,
            Operation::Subscribe
            | Operation::Unsubscribe
            | Operation::UpdateSubscription
            | Operation::UpdateTopics,
        ) => true,
        _ => false,
    }
}
