//! Messages posted to the worker.

use crate::api::ApiInfoMap;
use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// A command understood by the worker.
///
/// Dispatch is an exhaustive match; any unrecognized `command` value
/// decodes to [`Command::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Reconcile the stored push subscription identifier.
    PushSync {
        /// Identifier of the live subscription.
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },
    /// Seed the init-data store from the application.
    Init {
        /// Known endpoints per target.
        #[serde(default)]
        apis: ApiInfoMap,
        /// Snapshot of application stores.
        #[serde(default)]
        stores: serde_json::Value,
        /// Epoch millis of the snapshot.
        #[serde(default)]
        timestamp: Option<u64>,
    },
    /// Anything else.
    #[serde(other)]
    Unknown,
}

impl Command {
    /// Decodes a command from a JSON message.
    pub fn from_json(message: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(message)?)
    }

    /// Returns the command name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::PushSync { .. } => "pushSync",
            Command::Init { .. } => "init",
            Command::Unknown => "unknown",
        }
    }
}

/// The reply to every command. Always sent, even on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// `None` on success.
    pub error: Option<String>,
}

impl CommandReply {
    /// A successful reply.
    pub fn ok() -> Self {
        Self { error: None }
    }

    /// A failed reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    /// Returns true on success.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
