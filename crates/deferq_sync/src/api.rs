//! Fresh api context for replays.

use crate::context::WorkerContext;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkRequest;
use deferq_protocol::{ApiInfo, ApiInfoMap, AuthContext};
use tracing::debug;

/// Re-derives the authentication context before a replay.
///
/// Stored tokens rotate on the server, so replays triggered long after the
/// deferral fetch a fresh one instead of trusting the cached copy.
pub struct ApiResolver {
    ctx: WorkerContext,
}

impl ApiResolver {
    /// Creates a resolver.
    pub fn new(ctx: &WorkerContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Fetches the current authentication context from the whoami endpoint.
    pub async fn fresh_auth(&self) -> SyncResult<AuthContext> {
        let endpoint = &self.ctx.config.whoami_endpoint;
        let response = self
            .ctx
            .network
            .send(NetworkRequest::get(endpoint.clone()))
            .await?;
        if !self.ctx.config.success.accepts(&response) {
            return Err(SyncError::Rejected {
                status: response.status,
            });
        }
        debug!(endpoint = %endpoint, "fetched fresh auth context");
        Ok(AuthContext::from_whoami(&response.body)?)
    }

    /// Returns api info for `target` with a fresh authentication context.
    ///
    /// The endpoint comes from the seeded api map; a target that was never
    /// seeded is its own endpoint.
    pub async fn resolve(&self, target: &str) -> SyncResult<ApiInfo> {
        let auth = self.fresh_auth().await?;
        let endpoint = self
            .ctx
            .init_data()
            .apis()
            .await?
            .remove(target)
            .map_or_else(|| target.to_string(), |api| api.endpoint);
        Ok(ApiInfo::new(endpoint, auth))
    }

    /// A one-entry api map for `target`.
    pub async fn resolve_map(&self, target: &str) -> SyncResult<ApiInfoMap> {
        let api = self.resolve(target).await?;
        Ok(ApiInfoMap::from([(target.to_string(), api)]))
    }
}
