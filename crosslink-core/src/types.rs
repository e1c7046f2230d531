//! Identifier types.
//!
//! - [`NodeId`]: opaque name of one running instance
//! - [`EntityId`]: stable id of a connected entity (player, staff member)
//! - [`CorrelationId`]: pairs a lookup request with its responses
//! - [`NameKey`]: case-insensitive key for entity names

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one running node.
///
/// Assigned from configuration at startup and embedded in every outbound
/// envelope as `origin_node`. Two nodes sharing an id would silently drop
/// each other's broadcasts.
///
/// # Examples
///
/// ```
/// use crosslink_core::NodeId;
///
/// let node = NodeId::new("lobby-1");
/// assert_eq!(node.as_str(), "lobby-1");
/// assert_eq!(node.to_string(), "lobby-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable identifier of a connected entity.
///
/// Serialized as a hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Correlation id of one lookup round trip.
///
/// Random v4 UUIDs make collisions between concurrent lookups on different
/// nodes negligible without any coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Case-insensitive key for entity names.
///
/// Entity names are unique per network ignoring case, so `Alice` and
/// `alice` address the same entity. The key keeps the lowercased form only;
/// callers keep the display name next to it.
///
/// # Examples
///
/// ```
/// use crosslink_core::NameKey;
///
/// assert_eq!(NameKey::new("Alice"), NameKey::new("aLICE"));
/// assert!(NameKey::new("Alice").starts_with("al"));
/// assert!(NameKey::new("Alice").starts_with("AL"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey(String);

impl NameKey {
    /// Normalize a name into a key.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Whether the key starts with `prefix`, ignoring case.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(&prefix.to_lowercase())
    }

    /// Borrow the normalized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
