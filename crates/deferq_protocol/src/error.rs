//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or parsing protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A retry-trigger tag is not of the form `<class>:<target>`.
    #[error("malformed sync tag {tag:?}: {reason}")]
    MalformedTag {
        /// The rejected tag.
        tag: String,
        /// What is missing.
        reason: &'static str,
    },

    /// A request body could not be serialized for the wire.
    #[error("invalid body: {0}")]
    InvalidBody(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidBody(e.to_string())
    }
}
