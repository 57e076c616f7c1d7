//! Queued requests and their classification.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Epoch milliseconds at deferral time.
///
/// Doubles as the storage key of a [`QueuedRequest`] and as the
/// latest-wins ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the raw millisecond value.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the storage key for this timestamp.
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// The family a deferred request belongs to.
///
/// Values written by newer builds survive as [`RequestKind::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestKind {
    /// Contact form submission.
    Contact,
    /// Push subscription lifecycle.
    Push,
    /// Any type this build does not know.
    Unknown(String),
}

impl RequestKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::Contact => "contact",
            RequestKind::Push => "push",
            RequestKind::Unknown(s) => s,
        }
    }
}

impl From<String> for RequestKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "contact" => RequestKind::Contact,
            "push" => RequestKind::Push,
            _ => RequestKind::Unknown(s),
        }
    }
}

impl From<RequestKind> for String {
    fn from(kind: RequestKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation a deferred request performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    /// Submit a contact message.
    Contact,
    /// Create a push subscription.
    Subscribe,
    /// Remove a push subscription.
    Unsubscribe,
    /// Move a subscription from an old identifier to a new one.
    UpdateSubscription,
    /// Change the topics of a subscription.
    UpdateTopics,
    /// Request a demo notification.
    Demo,
    /// Any operation this build does not know.
    Unknown(String),
}

impl Operation {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Contact => "contact",
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::UpdateSubscription => "updateSubscription",
            Operation::UpdateTopics => "updateTopics",
            Operation::Demo => "demo",
            Operation::Unknown(s) => s,
        }
    }
}

impl From<String> for Operation {
    fn from(s: String) -> Self {
        match s.as_str() {
            "contact" => Operation::Contact,
            "subscribe" => Operation::Subscribe,
            "unsubscribe" => Operation::Unsubscribe,
            "updateSubscription" => Operation::UpdateSubscription,
            "updateTopics" => Operation::UpdateTopics,
            "demo" => Operation::Demo,
            _ => Operation::Unknown(s),
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// How a payload body is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    /// `application/json`
    #[default]
    Json,
    /// `text/plain`
    Text,
}

impl BodyType {
    /// Returns the content type header value.
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyType::Json => "application/json",
            BodyType::Text => "text/plain;charset=UTF-8",
        }
    }
}

/// The wire payload of a mutation. Contains nothing but what the server sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// HTTP method.
    pub method: Method,
    /// Request body.
    pub body: serde_json::Value,
    /// Body encoding.
    #[serde(rename = "bodyType", default)]
    pub body_type: BodyType,
}

impl Payload {
    /// Creates a JSON payload.
    pub fn json(method: Method, body: serde_json::Value) -> Self {
        Self {
            method,
            body,
            body_type: BodyType::Json,
        }
    }

    /// Creates a plain-text payload.
    pub fn text(method: Method, body: impl Into<String>) -> Self {
        Self {
            method,
            body: serde_json::Value::String(body.into()),
            body_type: BodyType::Text,
        }
    }

    /// Returns a top-level string property of a JSON object body.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(serde_json::Value::as_str)
    }

    /// Serializes the body for the wire.
    pub fn encode_body(&self) -> ProtocolResult<Vec<u8>> {
        match (self.body_type, &self.body) {
            (_, serde_json::Value::Null) if self.method == Method::Get => Ok(Vec::new()),
            (BodyType::Json, body) => Ok(serde_json::to_vec(body)?),
            (BodyType::Text, serde_json::Value::String(s)) => Ok(s.as_bytes().to_vec()),
            (BodyType::Text, other) => Err(ProtocolError::InvalidBody(format!(
                "text body must be a string, got {other}"
            ))),
        }
    }
}

/// Classification metadata of a deferred mutation.
///
/// Produced once by the [`classifier`](crate::classifier) and never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    /// Request family.
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// Mutation within the family.
    pub operation: Operation,
    /// Latest-wins grouping key.
    pub key: Option<String>,
    /// `true`: retry silently later. `false`: report failure to the user now.
    #[serde(rename = "userReplayable")]
    pub user_replayable: bool,
}

impl Fallback {
    /// Returns true if this is `kind` / `operation`.
    pub fn is(&self, kind: &RequestKind, operation: &Operation) -> bool {
        &self.kind == kind && &self.operation == operation
    }
}

/// An outbound mutation together with its classification.
///
/// The classification travels alongside the payload and is never
/// serialized into the wire body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// What the server receives.
    pub payload: Payload,
    /// How the engine treats it.
    pub classification: Fallback,
}

impl RequestEnvelope {
    /// Creates an envelope.
    pub fn new(payload: Payload, classification: Fallback) -> Self {
        Self {
            payload,
            classification,
        }
    }
}

/// A durable record of one deferred mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Deferral time; the storage key.
    pub timestamp: Timestamp,
    /// Remote endpoint grouping, resolved through an [`ApiInfoMap`](crate::ApiInfoMap).
    pub target: String,
    /// The original mutation.
    pub payload: Payload,
    /// Classification produced at deferral.
    pub fallback: Fallback,
    /// Failed replay attempts so far.
    #[serde(rename = "failureCount", default)]
    pub failure_count: u32,
}

impl QueuedRequest {
    /// Creates a fresh record from an envelope.
    pub fn new(timestamp: Timestamp, target: impl Into<String>, envelope: RequestEnvelope) -> Self {
        Self {
            timestamp,
            target: target.into(),
            payload: envelope.payload,
            fallback: envelope.classification,
            failure_count: 0,
        }
    }

    /// Returns the storage key.
    pub fn key(&self) -> String {
        self.timestamp.key()
    }

    /// Returns true if this is `kind` / `operation`.
    pub fn is(&self, kind: &RequestKind, operation: &Operation) -> bool {
        self.fallback.is(kind, operation)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| ProtocolError::Codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Codec(e.to_string()))
    }
}
