//! Replay-time API context.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps a request `target` to what is needed to replay it.
pub type ApiInfoMap = HashMap<String, ApiInfo>;

/// Authentication context attached to a request at replay time.
///
/// Rotates on the server; a stored copy may be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Anti-forgery token.
    #[serde(rename = "csrfToken", default)]
    pub csrf_token: Option<String>,
}

impl AuthContext {
    /// Creates a context carrying `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            csrf_token: Some(token.into()),
        }
    }

    /// Parses the body of a whoami-style response.
    ///
    /// Unknown fields are ignored; a missing token yields an empty context.
    pub fn from_whoami(body: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Endpoint and credentials for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    /// Absolute or base-relative URL the request is sent to.
    pub endpoint: String,
    /// Current authentication context.
    #[serde(rename = "authContext", default)]
    pub auth: AuthContext,
}

impl ApiInfo {
    /// Creates an api info entry.
    pub fn new(endpoint: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whoami_parsing() {
        let auth = AuthContext::from_whoami(br#"{"csrfToken":"t0k3n","user":null}"#).unwrap();
        assert_eq!(auth.csrf_token.as_deref(), Some("t0k3n"));

        let empty = AuthContext::from_whoami(b"{}").unwrap();
        assert_eq!(empty, AuthContext::default());

        assert!(AuthContext::from_whoami(b"<html>").is_err());
    }

    #[test]
    fn api_info_wire_shape() {
        let info = ApiInfo::new("/api/push", AuthContext::with_token("abc"));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["authContext"]["csrfToken"], "abc");
        let back: ApiInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, info);
    }
}
