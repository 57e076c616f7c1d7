//! Worker entry points.
//!
//! A [`Worker`] owns one [`WorkerContext`] and turns platform events into
//! engine calls:
//! - posted messages ([`Worker::handle_message`])
//! - retry triggers ([`Worker::on_retry_trigger`])
//! - worker start ([`Worker::on_start`])
//! - outbound mutations ([`Worker::send_or_defer`])
//!
//! Every event runs as an independent task; nothing here holds state
//! between events except the store.

use crate::api::ApiResolver;
use crate::context::WorkerContext;
use crate::deferral::{DeferOutcome, DeferralEngine};
use crate::error::SyncResult;
use crate::freshness::{ContentCache, FreshnessRace, MemoryContentCache, RaceOutcome};
use crate::network::{rehydrate, NetworkRequest, NetworkResponse};
use crate::reconciler::SubscriptionReconciler;
use crate::synchronizer::{settle_success, ServiceOptions, ServiceOutcome, Synchronizer};
use deferq_protocol::{
    ApiInfo, AuthContext, Command, CommandReply, RequestEnvelope, SyncTag, TagClass, Timestamp,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an outbound mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server answered. The caller inspects the status.
    Responded(NetworkResponse),
    /// No response; the mutation was deferred.
    Deferred(DeferOutcome),
}

impl SendOutcome {
    /// The status to report to the user.
    pub fn status(&self) -> u16 {
        match self {
            SendOutcome::Responded(response) => response.status,
            SendOutcome::Deferred(outcome) => outcome.status(),
        }
    }
}

/// A background worker.
pub struct Worker {
    ctx: WorkerContext,
    synchronizer: Synchronizer,
    reconciler: SubscriptionReconciler,
    deferral: DeferralEngine,
    resolver: ApiResolver,
    freshness: FreshnessRace,
}

impl Worker {
    /// Creates a worker with an in-memory content cache.
    pub fn new(ctx: WorkerContext) -> Self {
        Self::with_content_cache(ctx, Arc::new(MemoryContentCache::new()))
    }

    /// Creates a worker over `cache`.
    pub fn with_content_cache(ctx: WorkerContext, cache: Arc<dyn ContentCache>) -> Self {
        Self {
            synchronizer: Synchronizer::new(&ctx),
            reconciler: SubscriptionReconciler::new(&ctx),
            deferral: DeferralEngine::new(&ctx),
            resolver: ApiResolver::new(&ctx),
            freshness: FreshnessRace::new(&ctx, cache),
            ctx,
        }
    }

    /// Returns the context.
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Returns the content race, for subscribing to change notifications.
    pub fn freshness(&self) -> &FreshnessRace {
        &self.freshness
    }

    /// Decodes and handles one posted message. Always produces a reply.
    pub async fn handle_message(&self, message: &[u8]) -> CommandReply {
        match Command::from_json(message) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => {
                warn!(error = %e, "undecodable message");
                CommandReply::error(e.to_string())
            }
        }
    }

    /// Handles one command. Always produces a reply.
    pub async fn handle_command(&self, command: Command) -> CommandReply {
        let name = command.name();
        let result = match command {
            Command::PushSync { subscription_id } => self
                .reconciler
                .reconcile(&subscription_id)
                .await
                .map(|outcome| debug!(?outcome, "push subscription reconciled")),
            Command::Init {
                apis,
                stores,
                timestamp,
            } => {
                let timestamp = timestamp.map_or_else(|| self.ctx.clock.now(), Timestamp);
                self.ctx.init_data().save(&apis, &stores, timestamp).await
            }
            Command::Unknown => {
                warn!("unknown command");
                return CommandReply::error("unknown command");
            }
        };

        match result {
            Ok(()) => {
                info!(command = name, "command handled");
                CommandReply::ok()
            }
            Err(e) => {
                warn!(command = name, error = %e, "command failed");
                CommandReply::error(e.to_string())
            }
        }
    }

    /// Handles a fired retry trigger.
    ///
    /// A malformed tag fails before any network call. For
    /// `deferredRequests:<target>`, a fresh auth context is fetched and the
    /// target's entries are replayed without failure bookkeeping. Other
    /// classes belong to other components and are ignored.
    pub async fn on_retry_trigger(&self, tag: &str) -> SyncResult<Vec<ServiceOutcome>> {
        let tag: SyncTag = tag.parse()?;
        match tag.class {
            TagClass::DeferredRequests => {
                let apis = self.resolver.resolve_map(&tag.target).await?;
                self.synchronizer
                    .service_all(&apis, ServiceOptions::unmanaged().for_target(tag.target))
                    .await
            }
            TagClass::Other(class) => {
                debug!(class = %class, "ignoring retry trigger for another component");
                Ok(Vec::new())
            }
        }
    }

    /// Replays the queue after a restart, with the seeded api map and
    /// failure bookkeeping.
    pub async fn on_start(&self) -> SyncResult<Vec<ServiceOutcome>> {
        let apis = self.ctx.init_data().apis().await?;
        self.synchronizer
            .service_all(&apis, ServiceOptions::managed())
            .await
    }

    /// Sends a mutation now, deferring it if no response arrives.
    ///
    /// A successful response prunes the queued entries it made moot. A
    /// failure response is returned as is; only network faults defer.
    pub async fn send_or_defer(
        &self,
        target: &str,
        envelope: RequestEnvelope,
    ) -> SyncResult<SendOutcome> {
        let api = self
            .ctx
            .init_data()
            .apis()
            .await?
            .remove(target)
            .unwrap_or_else(|| ApiInfo::new(target, AuthContext::default()));
        let request = rehydrate(&envelope.payload, &api, &self.ctx.config)?;

        match self.ctx.network.send(request).await {
            Ok(response) => {
                if self.ctx.config.success.accepts(&response) {
                    settle_success(&self.ctx, &envelope.classification, &envelope.payload)
                        .await?;
                }
                Ok(SendOutcome::Responded(response))
            }
            Err(e) if e.is_network_fault() => {
                debug!(api = target, error = %e, "send failed, deferring");
                let outcome = self.deferral.defer(target, envelope).await?;
                Ok(SendOutcome::Deferred(outcome))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches content through the cache/network race.
    pub async fn fetch_content(&self, key: &str, request: NetworkRequest) -> SyncResult<RaceOutcome> {
        self.freshness.fetch(key, request).await
    }
}
