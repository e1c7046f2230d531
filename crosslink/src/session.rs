//! Host-side collaborators.
//!
//! crosslink does not own connections to entities. The host exposes its
//! local sessions through [`SessionProvider`] and may screen message
//! content through [`ContentPolicy`].

use std::collections::HashSet;

use crosslink_core::{EntityId, NameKey};
use dashmap::DashMap;

/// An entity connected to this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntity {
    /// Stable id.
    pub id: EntityId,
    /// Display name, unique across the network ignoring case.
    pub name: String,
    /// Where on this node the entity currently is (server, room, world).
    pub location: String,
}

impl LocalEntity {
    /// Create a new entity record.
    pub fn new(id: EntityId, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Access to the entities connected to this node.
///
/// Called from subscription workers, so implementations must be cheap and
/// must not block on the network.
pub trait SessionProvider: Send + Sync + 'static {
    /// Every entity currently connected.
    fn local_entities(&self) -> Vec<LocalEntity>;

    /// Find a connected entity by name, ignoring case.
    fn find_by_name(&self, name: &str) -> Option<LocalEntity> {
        let key = NameKey::new(name);
        self.local_entities()
            .into_iter()
            .find(|e| NameKey::new(&e.name) == key)
    }

    /// Find a connected entity by id.
    fn find_by_id(&self, id: EntityId) -> Option<LocalEntity> {
        self.local_entities().into_iter().find(|e| e.id == id)
    }

    /// Whether `id` holds `capability`.
    fn has_capability(&self, id: EntityId, capability: &str) -> bool;

    /// Show `text` to `id`. Returns `false` when the entity is gone.
    fn deliver(&self, id: EntityId, text: &str) -> bool;
}

/// Outcome of a [`ContentPolicy`] review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// Send the (possibly rewritten) text.
    Allow(String),
    /// Drop the message.
    Reject,
}

/// Screens directed message text before dispatch and again on delivery.
pub trait ContentPolicy: Send + Sync + 'static {
    /// Review `text` sent by `sender`.
    fn review(&self, sender: EntityId, text: &str) -> PolicyVerdict;
}

/// Policy that lets everything through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ContentPolicy for AllowAll {
    fn review(&self, _sender: EntityId, text: &str) -> PolicyVerdict {
        PolicyVerdict::Allow(text.to_string())
    }
}

struct Session {
    entity: LocalEntity,
    capabilities: HashSet<String>,
    inbox: Vec<String>,
}

/// Session table kept in memory.
///
/// Used by the `crosslink-node` binary and by tests; every delivered line
/// is kept in the entity's inbox.
#[derive(Default)]
pub struct InMemorySessions {
    sessions: DashMap<EntityId, Session>,
}

impl InMemorySessions {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected entity with the given capabilities.
    pub fn connect(&self, entity: LocalEntity, capabilities: &[&str]) {
        let capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self.sessions.insert(
            entity.id,
            Session {
                entity,
                capabilities,
                inbox: Vec::new(),
            },
        );
    }

    /// Remove an entity; returns its record.
    pub fn disconnect(&self, id: EntityId) -> Option<LocalEntity> {
        self.sessions.remove(&id).map(|(_, s)| s.entity)
    }

    /// Move an entity; returns its previous location.
    pub fn set_location(&self, id: EntityId, location: impl Into<String>) -> Option<String> {
        self.sessions
            .get_mut(&id)
            .map(|mut s| std::mem::replace(&mut s.entity.location, location.into()))
    }

    /// Grant a capability.
    pub fn grant(&self, id: EntityId, capability: &str) {
        if let Some(mut s) = self.sessions.get_mut(&id) {
            s.capabilities.insert(capability.to_string());
        }
    }

    /// Lines delivered to `id` so far.
    pub fn inbox(&self, id: EntityId) -> Vec<String> {
        self.sessions
            .get(&id)
            .map(|s| s.inbox.clone())
            .unwrap_or_default()
    }

    /// Take and clear the lines delivered to `id`.
    pub fn drain_inbox(&self, id: EntityId) -> Vec<String> {
        self.sessions
            .get_mut(&id)
            .map(|mut s| std::mem::take(&mut s.inbox))
            .unwrap_or_default()
    }
}

impl SessionProvider for InMemorySessions {
    fn local_entities(&self) -> Vec<LocalEntity> {
        self.sessions.iter().map(|s| s.entity.clone()).collect()
    }

    fn find_by_id(&self, id: EntityId) -> Option<LocalEntity> {
        self.sessions.get(&id).map(|s| s.entity.clone())
    }

    fn has_capability(&self, id: EntityId, capability: &str) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|s| s.capabilities.contains(capability))
    }

    fn deliver(&self, id: EntityId, text: &str) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut s) => {
                s.inbox.push(text.to_string());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_ignores_case() {
        let sessions = InMemorySessions::new();
        let alice = LocalEntity::new(EntityId::random(), "Alice", "hub");
        sessions.connect(alice.clone(), &[]);

        assert_eq!(sessions.find_by_name("aLiCe"), Some(alice.clone()));
        assert_eq!(sessions.find_by_id(alice.id), Some(alice));
        assert_eq!(sessions.find_by_name("bob"), None);
    }

    #[test]
    fn test_deliver_and_capabilities() {
        let sessions = InMemorySessions::new();
        let id = EntityId::random();
        sessions.connect(LocalEntity::new(id, "mod", "hub"), &["staff"]);

        assert!(sessions.has_capability(id, "staff"));
        assert!(!sessions.has_capability(id, "admin"));
        sessions.grant(id, "admin");
        assert!(sessions.has_capability(id, "admin"));

        assert!(sessions.deliver(id, "hello"));
        assert_eq!(sessions.drain_inbox(id), vec!["hello".to_string()]);
        assert!(sessions.inbox(id).is_empty());

        sessions.disconnect(id);
        assert!(!sessions.deliver(id, "gone"));
        assert!(!sessions.has_capability(id, "staff"));
    }

    #[test]
    fn test_set_location() {
        let sessions = InMemorySessions::new();
        let id = EntityId::random();
        sessions.connect(LocalEntity::new(id, "a", "lobby"), &[]);
        assert_eq!(sessions.set_location(id, "arena").as_deref(), Some("lobby"));
        assert_eq!(sessions.find_by_id(id).map(|e| e.location).as_deref(), Some("arena"));
    }

    #[test]
    fn test_allow_all() {
        assert_eq!(
            AllowAll.review(EntityId::random(), "hi"),
            PolicyVerdict::Allow("hi".to_string())
        );
    }
}
