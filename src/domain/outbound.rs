//! Outbound Node Value Objects
//!
//! An outbound node is a configured egress path the kernel can route
//! traffic through. The kernel owns the canonical copy; this client only
//! holds cached snapshots plus pending edits. Protocol and transport
//! parameters are opaque to the console and travel as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Outbound tag validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Outbound tag is empty")]
    Empty,

    #[error("Outbound tag exceeds maximum length of 64 characters: {0}")]
    TooLong(usize),

    #[error("Outbound tag contains control character")]
    ControlCharacter,
}

/// Outbound node identity
///
/// Tags name an outbound in the kernel configuration and in route rule
/// actions, so they must be stable, non-empty and printable. The kernel
/// treats them as opaque strings beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundTag(String);

impl OutboundTag {
    /// Maximum tag length accepted by the console
    pub const MAX_LENGTH: usize = 64;

    /// Create a new tag with validation
    pub fn new(tag: impl Into<String>) -> Result<Self, TagError> {
        let tag = tag.into();

        if tag.is_empty() {
            return Err(TagError::Empty);
        }

        if tag.len() > Self::MAX_LENGTH {
            return Err(TagError::TooLong(tag.len()));
        }

        if tag.chars().any(|c| c.is_control()) {
            return Err(TagError::ControlCharacter);
        }

        Ok(Self(tag))
    }

    /// Get the tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutboundTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OutboundTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OutboundTag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for OutboundTag {
    type Error = TagError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// An outbound node as the kernel reports it
///
/// Everything besides the identifying tag is protocol-specific and kept
/// as an opaque map, flattened into the node object on the wire:
///
/// ```json
/// { "tag": "proxy-us", "type": "shadowsocks", "server": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundNode {
    pub tag: OutboundTag,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl OutboundNode {
    /// Build a node from a tag and opaque parameters
    pub fn new(tag: OutboundTag, params: Map<String, Value>) -> Self {
        Self { tag, params }
    }

    /// Serialize into the flattened JSON object the kernel expects
    pub fn to_value(&self) -> Value {
        let mut object = self.params.clone();
        object.insert("tag".to_string(), Value::String(self.tag.as_str().to_string()));
        Value::Object(object)
    }
}
