//! Serviceability rules.
//!
//! Pure functions over the full collection of queued requests. They
//! decide which entries are still worth replaying and which are made moot
//! by another entry's success. The async wrappers in `deferq_sync` apply
//! these decisions to the store.
//!
//! ## Invariants
//!
//! - At most one serviceable entry per `(type, operation class, key or property)`
//! - Ties are impossible: timestamps are unique storage keys
//! - Entry identity is the timestamp, never deep equality
//! - Unknown types are never serviceable and never trigger pruning

use crate::request::{Fallback, Operation, Payload, QueuedRequest, RequestKind, Timestamp};
use std::collections::{BTreeMap, HashSet};

/// Body property that names the topic of an `updateTopics` request.
pub const DEFAULT_TOPIC_PROPERTY: &str = "tag";

/// Returns the entry with the greatest timestamp.
pub fn latest<'a, I>(entries: I) -> Option<&'a QueuedRequest>
where
    I: IntoIterator<Item = &'a QueuedRequest>,
{
    entries.into_iter().max_by_key(|e| e.timestamp)
}

fn of<'a>(
    entries: &'a [QueuedRequest],
    kind: &'a RequestKind,
    operation: &'a Operation,
) -> impl Iterator<Item = &'a QueuedRequest> + 'a {
    entries.iter().filter(move |e| e.is(kind, operation))
}

/// The latest contact submission per sender key.
pub fn latest_contacts(entries: &[QueuedRequest]) -> Vec<&QueuedRequest> {
    let mut by_key: BTreeMap<Option<&str>, &QueuedRequest> = BTreeMap::new();
    for entry in of(entries, &RequestKind::Contact, &Operation::Contact) {
        by_key
            .entry(entry.fallback.key.as_deref())
            .and_modify(|current| {
                if entry.timestamp > current.timestamp {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }
    sorted(by_key.into_values().collect())
}

/// The latest pending subscription-identity migration.
pub fn latest_update_subscription(entries: &[QueuedRequest]) -> Option<&QueuedRequest> {
    latest(of(entries, &RequestKind::Push, &Operation::UpdateSubscription))
}

/// The most recent of all `subscribe` and `unsubscribe` entries.
///
/// Only the winner is ever actionable: a later unsubscribe supersedes an
/// earlier subscribe and vice versa.
pub fn membership_winner(entries: &[QueuedRequest]) -> Option<&QueuedRequest> {
    latest(entries.iter().filter(|e| {
        e.fallback.kind == RequestKind::Push
            && matches!(
                e.fallback.operation,
                Operation::Subscribe | Operation::Unsubscribe
            )
    }))
}

/// True when the winner of [`membership_winner`] leaves the user subscribed.
///
/// An absent winner counts as subscribed; the live subscription state then
/// decides.
pub fn winner_keeps_subscription(entries: &[QueuedRequest]) -> bool {
    membership_winner(entries)
        .map_or(true, |w| w.fallback.operation != Operation::Unsubscribe)
}

/// True when topic updates could be serviceable, so the caller must ask
/// whether a live subscription exists.
pub fn needs_subscription_check(entries: &[QueuedRequest]) -> bool {
    winner_keeps_subscription(entries)
        && of(entries, &RequestKind::Push, &Operation::UpdateTopics)
            .next()
            .is_some()
}

/// The latest `updateTopics` entry per distinct topic property value.
pub fn latest_topics_per_tag<'a>(
    entries: &'a [QueuedRequest],
    topic_property: &str,
) -> Vec<&'a QueuedRequest> {
    let mut by_tag: BTreeMap<Option<&str>, &QueuedRequest> = BTreeMap::new();
    for entry in of(entries, &RequestKind::Push, &Operation::UpdateTopics) {
        by_tag
            .entry(entry.payload.property(topic_property))
            .and_modify(|current| {
                if entry.timestamp > current.timestamp {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }
    sorted(by_tag.into_values().collect())
}

/// Computes the serviceable subset.
///
/// Contact entries come first, then push entries in replay priority:
/// 1. the latest `updateSubscription`
/// 2. the winner of `subscribe` / `unsubscribe`
/// 3. if the winner keeps the user subscribed and `live_subscription` is
///    true, the latest `updateTopics` per topic
pub fn select_serviceable(
    entries: &[QueuedRequest],
    topic_property: &str,
    live_subscription: bool,
) -> Vec<QueuedRequest> {
    let mut selected: Vec<&QueuedRequest> = latest_contacts(entries);

    selected.extend(latest_update_subscription(entries));
    selected.extend(membership_winner(entries));

    if winner_keeps_subscription(entries) && live_subscription {
        selected.extend(latest_topics_per_tag(entries, topic_property));
    }

    selected.into_iter().cloned().collect()
}

/// Timestamps of entries in `all` that are not in `serviceable`.
pub fn unserviceable(all: &[QueuedRequest], serviceable: &[QueuedRequest]) -> Vec<Timestamp> {
    let keep: HashSet<Timestamp> = serviceable.iter().map(|e| e.timestamp).collect();
    all.iter()
        .map(|e| e.timestamp)
        .filter(|ts| !keep.contains(ts))
        .collect()
}

/// Timestamps of entries made moot by one successful request.
///
/// Returns `None` when the successful request's type has no policy; such
/// requests prune nothing.
///
/// - contact: every contact entry with the same key
/// - push `subscribe` / `unsubscribe`: every push entry except `demo` and
///   `updateSubscription`
/// - push `updateTopics`: every `unsubscribe`, and every `updateTopics`
///   for the same topic
pub fn moot_after_success(
    all: &[QueuedRequest],
    success: &Fallback,
    body: &Payload,
    topic_property: &str,
) -> Option<Vec<Timestamp>> {
    let moot: Vec<Timestamp> = match &success.kind {
        RequestKind::Contact => all
            .iter()
            .filter(|e| {
                e.fallback.kind == RequestKind::Contact && e.fallback.key == success.key
            })
            .map(|e| e.timestamp)
            .collect(),
        RequestKind::Push => match success.operation {
            Operation::Subscribe | Operation::Unsubscribe => all
                .iter()
                .filter(|e| {
                    e.fallback.kind == RequestKind::Push
                        && !matches!(
                            e.fallback.operation,
                            Operation::Demo | Operation::UpdateSubscription
                        )
                })
                .map(|e| e.timestamp)
                .collect(),
            Operation::UpdateTopics => {
                let tag = body.property(topic_property);
                all.iter()
                    .filter(|e| {
                        e.is(&RequestKind::Push, &Operation::Unsubscribe)
                            || (e.is(&RequestKind::Push, &Operation::UpdateTopics)
                                && e.payload.property(topic_property) == tag)
                    })
                    .map(|e| e.timestamp)
                    .collect()
            }
            _ => Vec::new(),
        },
        RequestKind::Unknown(_) => return None,
    };
    Some(moot)
}

fn sorted(mut entries: Vec<&QueuedRequest>) -> Vec<&QueuedRequest> {
    entries.sort_by_key(|e| e.timestamp);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier;
    use crate::request::{Method, RequestEnvelope};
    use proptest::prelude::*;
    use serde_json::json;

    fn entry(ts: u64, envelope: RequestEnvelope) -> QueuedRequest {
        QueuedRequest::new(Timestamp(ts), "/api", envelope)
    }

    fn contact(ts: u64, reply_to: &str) -> QueuedRequest {
        entry(
            ts,
            classifier::contact(Payload::json(Method::Post, json!({"replyTo": reply_to}))),
        )
    }

    fn push(ts: u64, operation: Operation) -> QueuedRequest {
        entry(ts, classifier::push(Payload::json(Method::Post, json!({})), operation))
    }

    fn topics(ts: u64, tag: &str) -> QueuedRequest {
        entry(
            ts,
            classifier::push(
                Payload::json(Method::Put, json!({"tag": tag})),
                Operation::UpdateTopics,
            ),
        )
    }

    fn stamps(entries: &[QueuedRequest]) -> Vec<u64> {
        entries.iter().map(|e| e.timestamp.0).collect()
    }

    #[test]
    fn latest_contact_per_sender() {
        let entries = vec![
            contact(1, "a@x"),
            contact(2, "b@x"),
            contact(3, "a@x"),
            contact(4, "b@x"),
            contact(5, "c@x"),
        ];
        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, false);
        assert_eq!(stamps(&selected), vec![3, 4, 5]);
    }

    #[test]
    fn push_rules_in_priority_order() {
        let entries = vec![
            topics(10, "news"),
            push(1, Operation::UpdateSubscription),
            push(2, Operation::Subscribe),
            push(5, Operation::UpdateSubscription),
            push(3, Operation::Unsubscribe),
            push(4, Operation::Subscribe),
        ];
        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
        assert_eq!(stamps(&selected), vec![5, 4, 10]);
    }

    #[test]
    fn later_unsubscribe_drops_topics() {
        let entries = vec![
            push(1, Operation::Subscribe),
            topics(2, "news"),
            push(3, Operation::Unsubscribe),
        ];
        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
        assert_eq!(stamps(&selected), vec![3]);
        assert!(!needs_subscription_check(&entries));
    }

    #[test]
    fn topics_need_live_subscription() {
        let entries = vec![topics(1, "news"), topics(2, "blog"), topics(3, "news")];
        assert!(needs_subscription_check(&entries));

        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, false);
        assert!(selected.is_empty());

        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
        assert_eq!(stamps(&selected), vec![2, 3]);
    }

    #[test]
    fn demo_and_unknown_are_never_serviceable() {
        let unknown = entry(
            2,
            RequestEnvelope::new(
                Payload::json(Method::Post, json!({})),
                classifier::classify(
                    RequestKind::Unknown("newsletter".into()),
                    &Payload::json(Method::Post, json!({})),
                    None,
                    Operation::Unknown("optIn".into()),
                ),
            ),
        );
        let entries = vec![push(1, Operation::Demo), unknown];
        let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
        assert!(selected.is_empty());
        assert_eq!(
            unserviceable(&entries, &selected),
            vec![Timestamp(1), Timestamp(2)]
        );
    }

    #[test]
    fn unserviceable_is_by_timestamp() {
        let all = vec![contact(1, "a@x"), contact(2, "a@x")];
        let mut kept = all[1].clone();
        kept.failure_count = 2;
        assert_eq!(unserviceable(&all, &[kept]), vec![Timestamp(1)]);
    }

    #[test]
    fn contact_success_prunes_same_sender() {
        let all = vec![
            contact(1, "a@x"),
            contact(2, "a@x"),
            contact(3, "a@x"),
            contact(4, "b@x"),
        ];
        let moot = moot_after_success(
            &all,
            &all[2].fallback,
            &all[2].payload,
            DEFAULT_TOPIC_PROPERTY,
        )
        .unwrap();
        assert_eq!(moot, vec![Timestamp(1), Timestamp(2), Timestamp(3)]);
    }

    #[test]
    fn membership_success_spares_demo_and_migration() {
        let all = vec![
            push(1, Operation::Subscribe),
            push(2, Operation::Demo),
            push(3, Operation::UpdateSubscription),
            topics(4, "news"),
            push(5, Operation::Unsubscribe),
            contact(6, "a@x"),
        ];
        let moot = moot_after_success(
            &all,
            &all[4].fallback,
            &all[4].payload,
            DEFAULT_TOPIC_PROPERTY,
        )
        .unwrap();
        assert_eq!(moot, vec![Timestamp(1), Timestamp(4), Timestamp(5)]);
    }

    #[test]
    fn topic_success_prunes_unsubscribe_and_same_tag() {
        let all = vec![
            topics(1, "news"),
            push(2, Operation::Unsubscribe),
            topics(3, "news"),
            topics(4, "blog"),
        ];
        let moot = moot_after_success(
            &all,
            &all[2].fallback,
            &all[2].payload,
            DEFAULT_TOPIC_PROPERTY,
        )
        .unwrap();
        assert_eq!(moot, vec![Timestamp(1), Timestamp(2), Timestamp(3)]);
    }

    #[test]
    fn unknown_success_has_no_policy() {
        let all = vec![contact(1, "a@x")];
        let fallback = Fallback {
            kind: RequestKind::Unknown("newsletter".into()),
            operation: Operation::Unknown("optIn".into()),
            key: None,
            user_replayable: false,
        };
        let body = Payload::json(Method::Post, json!({}));
        assert!(moot_after_success(&all, &fallback, &body, DEFAULT_TOPIC_PROPERTY).is_none());
    }

    proptest! {
        #[test]
        fn membership_latest_wins(ops in prop::collection::btree_map(0u64..100_000, any::<bool>(), 1..40)) {
            let entries: Vec<QueuedRequest> = ops
                .iter()
                .map(|(ts, subscribe)| {
                    let op = if *subscribe { Operation::Subscribe } else { Operation::Unsubscribe };
                    push(*ts, op)
                })
                .collect();
            let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
            let max = *ops.keys().max().unwrap();

            prop_assert_eq!(selected.len(), 1);
            prop_assert_eq!(selected[0].timestamp, Timestamp(max));
        }

        #[test]
        fn serviceable_is_subset(ops in prop::collection::btree_map(0u64..100_000, 0u8..6, 0..40)) {
            let entries: Vec<QueuedRequest> = ops
                .iter()
                .map(|(ts, n)| match n {
                    0 => contact(*ts, if ts % 2 == 0 { "a@x" } else { "b@x" }),
                    1 => push(*ts, Operation::Subscribe),
                    2 => push(*ts, Operation::Unsubscribe),
                    3 => push(*ts, Operation::UpdateSubscription),
                    4 => topics(*ts, if ts % 3 == 0 { "news" } else { "blog" }),
                    _ => push(*ts, Operation::Demo),
                })
                .collect();
            let selected = select_serviceable(&entries, DEFAULT_TOPIC_PROPERTY, true);
            let removed = unserviceable(&entries, &selected);

            prop_assert_eq!(selected.len() + removed.len(), entries.len());
            let contacts = selected.iter().filter(|e| e.fallback.kind == RequestKind::Contact).count();
            prop_assert!(contacts <= 2);
        }
    }
}
