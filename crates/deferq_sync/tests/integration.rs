//! End-to-end tests for deferral, replay and reconciliation.

use deferq_protocol::{
    classifier, ApiInfo, ApiInfoMap, AuthContext, Method, Operation, Payload, QueuedRequest,
    RequestEnvelope, RequestKind, Timestamp,
};
use deferq_store::{FileStore, InMemoryStore, KeyValueStore};
use deferq_sync::{
    DeferOutcome, FixedPushCapability, ManualClock, MockNetwork, MockReply, MockRetryTrigger,
    NoRetryTrigger, ReconcileOutcome, ServiceOptions, ServiceOutcome, SyncConfig, SyncError,
    Synchronizer, Worker, WorkerContext, MAX_FAILURES,
};
use serde_json::json;
use std::sync::Arc;

fn apis() -> ApiInfoMap {
    ApiInfoMap::from([
        (
            "/api/contact".to_string(),
            ApiInfo::new("/api/contact", AuthContext::with_token("tok")),
        ),
        (
            "/api/push".to_string(),
            ApiInfo::new("/api/push", AuthContext::with_token("tok")),
        ),
    ])
}

fn context(store: Arc<dyn KeyValueStore>, network: Arc<MockNetwork>) -> WorkerContext {
    WorkerContext::new(SyncConfig::default(), store, network)
        .with_clock(Arc::new(ManualClock::starting_at(1)))
}

fn contact(reply_to: &str) -> RequestEnvelope {
    classifier::contact(Payload::json(
        Method::Post,
        json!({ "replyTo": reply_to, "message": "hello" }),
    ))
}

fn push(operation: Operation, body: serde_json::Value) -> RequestEnvelope {
    classifier::push(Payload::json(Method::Post, body), operation)
}

async fn add(ctx: &WorkerContext, ts: u64, target: &str, envelope: RequestEnvelope) -> QueuedRequest {
    let entry = QueuedRequest::new(Timestamp(ts), target, envelope);
    ctx.queue().add(&entry).await.unwrap();
    entry
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/contact", MockReply::ok());
    network.reply("/api/push", MockReply::ok());
    let ctx = context(store, network.clone());

    add(&ctx, 1, "/api/contact", contact("a@x")).await;
    add(&ctx, 2, "/api/contact", contact("b@x")).await;
    add(&ctx, 3, "/api/push", push(Operation::Subscribe, json!({}))).await;

    let sync = Synchronizer::new(&ctx);
    let first = sync.service_all(&apis(), ServiceOptions::managed()).await.unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|o| matches!(o, ServiceOutcome::Delivered(_))));
    assert!(ctx.queue().all().await.unwrap().is_empty());

    let sent = network.sent().len();
    let second = sync.service_all(&apis(), ServiceOptions::managed()).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(network.sent().len(), sent);
}

#[tokio::test]
async fn abandonment_boundary() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/contact", MockReply::Status(500, vec![]));
    let ctx = context(Arc::new(InMemoryStore::new()), network);

    let mut last_chance = QueuedRequest::new(Timestamp(1), "/api/contact", contact("a@x"));
    last_chance.failure_count = MAX_FAILURES - 1;
    ctx.queue().add(&last_chance).await.unwrap();

    let mut retry = QueuedRequest::new(Timestamp(2), "/api/contact", contact("b@x"));
    retry.failure_count = MAX_FAILURES - 2;
    ctx.queue().add(&retry).await.unwrap();

    let outcomes = Synchronizer::new(&ctx)
        .service_all(&apis(), ServiceOptions::managed())
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            ServiceOutcome::Abandoned(last_chance),
            ServiceOutcome::Retained {
                timestamp: Timestamp(2),
                failure_count: MAX_FAILURES - 1
            },
        ]
    );
    let remaining = ctx.queue().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].timestamp, Timestamp(2));
    assert_eq!(remaining[0].failure_count, MAX_FAILURES - 1);
}

#[tokio::test]
async fn retained_entry_is_eventually_abandoned() {
    let network = Arc::new(MockNetwork::new());
    network.set_online(false);
    let ctx = context(Arc::new(InMemoryStore::new()), network);
    add(&ctx, 1, "/api/contact", contact("a@x")).await;

    let sync = Synchronizer::new(&ctx);
    let mut abandoned = false;
    for _ in 0..MAX_FAILURES {
        let outcomes = sync.service_all(&apis(), ServiceOptions::managed()).await.unwrap();
        abandoned = matches!(outcomes.as_slice(), [ServiceOutcome::Abandoned(_)]);
    }
    assert!(abandoned);
    assert!(ctx.queue().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn contact_success_prunes_older_submissions() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/contact", MockReply::ok());
    let ctx = context(Arc::new(InMemoryStore::new()), network.clone());

    add(&ctx, 1, "/api/contact", contact("a@x")).await;
    add(&ctx, 2, "/api/contact", contact("a@x")).await;
    add(&ctx, 3, "/api/contact", contact("a@x")).await;

    let outcomes = Synchronizer::new(&ctx)
        .service_all(&apis(), ServiceOptions::managed())
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ServiceOutcome::Delivered(Timestamp(3))]);
    assert_eq!(network.sent_to("/api/contact"), 1);
    assert!(ctx.queue().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn topic_success_prunes_unsubscribe_and_same_tag() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/push", MockReply::ok());
    let ctx = context(Arc::new(InMemoryStore::new()), network);

    add(&ctx, 1, "/api/push", push(Operation::UpdateTopics, json!({"tag": "news"}))).await;
    add(&ctx, 2, "/api/push", push(Operation::Unsubscribe, json!({}))).await;
    add(&ctx, 4, "/api/push", push(Operation::UpdateTopics, json!({"tag": "sport"}))).await;
    let success = QueuedRequest::new(
        Timestamp(3),
        "/api/push",
        push(Operation::UpdateTopics, json!({"tag": "news"})),
    );

    let all = ctx.queue().all().await.unwrap();
    deferq_sync::policy::prune_requests_by_policy(
        &ctx.queue(),
        &all,
        &success.fallback,
        &success.payload,
        "tag",
    )
    .await
    .unwrap();

    let remaining: Vec<Timestamp> = ctx
        .queue()
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.timestamp)
        .collect();
    assert_eq!(remaining, vec![Timestamp(4)]);
}

#[tokio::test]
async fn later_unsubscribe_wins_over_subscribe_and_topics() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/push", MockReply::ok());
    let push_cap = Arc::new(FixedPushCapability::new(true));
    let ctx = context(Arc::new(InMemoryStore::new()), network.clone()).with_push(push_cap.clone());

    add(&ctx, 1, "/api/push", push(Operation::Subscribe, json!({}))).await;
    add(&ctx, 2, "/api/push", push(Operation::UpdateTopics, json!({"tag": "news"}))).await;
    add(&ctx, 3, "/api/push", push(Operation::Unsubscribe, json!({}))).await;

    let outcomes = Synchronizer::new(&ctx)
        .service_all(&apis(), ServiceOptions::managed())
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ServiceOutcome::Delivered(Timestamp(3))]);
    assert_eq!(network.sent_to("/api/push"), 1);
    assert_eq!(push_cap.queries(), 0);
    assert!(ctx.queue().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_subscription_replays_before_membership() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/push", MockReply::ok());
    let ctx = context(Arc::new(InMemoryStore::new()), network.clone());

    add(&ctx, 1, "/api/push", push(Operation::Subscribe, json!({}))).await;
    add(
        &ctx,
        2,
        "/api/push",
        push(Operation::UpdateSubscription, json!({"existingId": "A", "newId": "B"})),
    )
    .await;

    let outcomes = Synchronizer::new(&ctx)
        .service_all(&apis(), ServiceOptions::managed())
        .await
        .unwrap();

    let order: Vec<Timestamp> = outcomes.iter().map(ServiceOutcome::timestamp).collect();
    assert_eq!(order, vec![Timestamp(2), Timestamp(1)]);
    assert_eq!(ctx.subscriptions().get().await.unwrap().as_deref(), Some("B"));
}

#[tokio::test]
async fn deferral_outcome_determinism() {
    let network = Arc::new(MockNetwork::new());
    let demo = || push(Operation::Demo, json!({}));

    let bare = context(Arc::new(InMemoryStore::new()), network.clone())
        .with_trigger(Arc::new(NoRetryTrigger));
    let engine = deferq_sync::DeferralEngine::new(&bare);
    assert!(matches!(engine.defer("/api/push", demo()).await.unwrap(), DeferOutcome::Failed(_)));
    assert!(engine.defer("/api/contact", contact("a@x")).await.unwrap().is_deferred());

    let triggered = context(Arc::new(InMemoryStore::new()), network)
        .with_trigger(Arc::new(MockRetryTrigger::new()));
    let engine = deferq_sync::DeferralEngine::new(&triggered);
    assert!(engine.defer("/api/push", demo()).await.unwrap().is_deferred());
}

#[tokio::test]
async fn reconciler_rotation_round_trip() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/whoami", MockReply::json(&json!({"csrfToken": "fresh"})));
    network.reply_once("/api/push", MockReply::ok());
    let ctx = context(Arc::new(InMemoryStore::new()), network.clone());
    let worker = Worker::new(ctx.clone());

    ctx.subscriptions().set("A").await.unwrap();
    let reply = worker.handle_message(br#"{"command":"pushSync","subscriptionId":"B"}"#).await;
    assert!(reply.is_ok());
    assert_eq!(ctx.subscriptions().get().await.unwrap().as_deref(), Some("B"));
    assert!(ctx.queue().all().await.unwrap().is_empty());

    ctx.subscriptions().set("A").await.unwrap();
    network.reply("/api/push", MockReply::Status(400, vec![]));
    let outcome = deferq_sync::SubscriptionReconciler::new(&ctx)
        .reconcile("B")
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Deferred(_)));
    assert_eq!(ctx.subscriptions().get().await.unwrap().as_deref(), Some("A"));

    let queued = ctx.queue().all().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].is(&RequestKind::Push, &Operation::UpdateSubscription));
}

#[tokio::test]
async fn push_sync_failure_still_replies() {
    let network = Arc::new(MockNetwork::new());
    network.set_online(false);
    let ctx = context(Arc::new(InMemoryStore::new()), network);
    ctx.subscriptions().set("A").await.unwrap();

    let reply = Worker::new(ctx)
        .handle_message(br#"{"command":"pushSync","subscriptionId":"B"}"#)
        .await;
    assert!(reply.error.is_some());
}

#[tokio::test]
async fn retry_trigger_replays_target_with_fresh_token() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/whoami", MockReply::json(&json!({"csrfToken": "fresh"})));
    network.reply("/api/push", MockReply::ok());
    let ctx = context(Arc::new(InMemoryStore::new()), network.clone())
        .with_trigger(Arc::new(MockRetryTrigger::new()));
    let worker = Worker::new(ctx.clone());

    add(&ctx, 1, "/api/contact", contact("a@x")).await;
    add(&ctx, 2, "/api/push", push(Operation::Subscribe, json!({}))).await;

    let outcomes = worker.on_retry_trigger("deferredRequests:/api/push").await.unwrap();
    assert_eq!(outcomes, vec![ServiceOutcome::Delivered(Timestamp(2))]);

    let replay = network
        .sent()
        .into_iter()
        .find(|r| r.url == "/api/push")
        .unwrap();
    assert_eq!(replay.header("x-csrf-token"), Some("fresh"));

    let remaining = ctx.queue().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].target, "/api/contact");
}

#[tokio::test]
async fn retry_trigger_failure_leaves_entry_untouched() {
    let network = Arc::new(MockNetwork::new());
    network.reply("/api/whoami", MockReply::json(&json!({})));
    network.reply("/api/contact", MockReply::Status(503, vec![]));
    let ctx = context(Arc::new(InMemoryStore::new()), network);
    add(&ctx, 1, "/api/contact", contact("a@x")).await;

    let err = Worker::new(ctx.clone())
        .on_retry_trigger("deferredRequests:/api/contact")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Rejected { status: 503 }));
    assert_eq!(ctx.queue().all().await.unwrap()[0].failure_count, 0);
}

#[tokio::test]
async fn restart_replays_with_seeded_apis() {
    let dir = tempfile::tempdir().unwrap();
    let network = Arc::new(MockNetwork::new());
    network.reply("https://example.com/contact", MockReply::ok());

    {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        network.set_online(false);
        let worker = Worker::new(context(store, network.clone()));
        worker
            .handle_message(
                br#"{"command":"init","apis":{"/api/contact":{"endpoint":"https://example.com/contact"}}}"#,
            )
            .await;
        let outcome = worker.send_or_defer("/api/contact", contact("a@x")).await.unwrap();
        assert_eq!(outcome.status(), 203);
    }

    network.set_online(true);
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let worker = Worker::new(context(store, network.clone()));
    let outcomes = worker.on_start().await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], ServiceOutcome::Delivered(_)));
    assert_eq!(network.sent_to("https://example.com/contact"), 2);
    assert!(worker.context().queue().all().await.unwrap().is_empty());
}
