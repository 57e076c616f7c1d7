//! Retry-trigger tags.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// The kind of work a retry trigger stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagClass {
    /// Replay the deferred request queue.
    DeferredRequests,
    /// A class registered by another component.
    Other(String),
}

impl TagClass {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            TagClass::DeferredRequests => "deferredRequests",
            TagClass::Other(s) => s,
        }
    }
}

impl From<&str> for TagClass {
    fn from(s: &str) -> Self {
        match s {
            "deferredRequests" => TagClass::DeferredRequests,
            other => TagClass::Other(other.to_string()),
        }
    }
}

/// A retry-trigger tag: `"<class>:<target>"`.
///
/// The target may itself contain colons; only the first one separates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTag {
    /// Operation class.
    pub class: TagClass,
    /// Request target the trigger replays.
    pub target: String,
}

impl SyncTag {
    /// Creates a tag replaying deferred requests for `target`.
    pub fn deferred_requests(target: impl Into<String>) -> Self {
        Self {
            class: TagClass::DeferredRequests,
            target: target.into(),
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.as_str(), self.target)
    }
}

impl FromStr for SyncTag {
    type Err = ProtocolError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| ProtocolError::MalformedTag {
            tag: tag.to_string(),
            reason,
        };

        let (class, target) = tag.split_once(':').ok_or_else(|| malformed("missing target"))?;
        if class.is_empty() {
            return Err(malformed("missing class"));
        }
        if target.is_empty() {
            return Err(malformed("missing target"));
        }

        Ok(Self {
            class: TagClass::from(class),
            target: target.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        let tag = SyncTag::deferred_requests("/api/push");
        assert_eq!(tag.to_string(), "deferredRequests:/api/push");
        assert_eq!(tag.to_string().parse::<SyncTag>().unwrap(), tag);
    }

    #[test]
    fn target_may_contain_colons() {
        let tag: SyncTag = "deferredRequests:https://example.com:8443/api".parse().unwrap();
        assert_eq!(tag.class, TagClass::DeferredRequests);
        assert_eq!(tag.target, "https://example.com:8443/api");
    }

    #[test]
    fn other_classes_are_kept() {
        let tag: SyncTag = "refreshContent:/home".parse().unwrap();
        assert_eq!(tag.class, TagClass::Other("refreshContent".into()));
    }

    #[test]
    fn malformed_tags() {
        for bad in ["deferredRequests", "deferredRequests:", ":/api", ""] {
            assert!(
                matches!(bad.parse::<SyncTag>(), Err(ProtocolError::MalformedTag { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
