//! TTL cache of entities living on other nodes.

use std::sync::Arc;
use std::time::Duration;

use crosslink_core::{EntityId, NameKey, NodeId};
use dashmap::DashMap;
use tokio::time::Instant;

/// A remote entity as last seen by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Display name.
    pub name: String,
    /// Stable id.
    pub entity_id: EntityId,
    /// Node the entity was last seen on.
    pub node: NodeId,
    /// Last insert or refresh.
    pub last_seen: Instant,
}

impl DirectoryEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}

/// Per-node cache of remote entities keyed by case-insensitive name.
///
/// # Architecture
///
/// ```text
/// ┌───────────────────────────────────────────────┐
/// │ DirectoryCache                                │
/// │                                               │
/// │  entries: NameKey → DirectoryEntry            │
/// │           (name, entity_id, node, last_seen)  │
/// │                                               │
/// │  writes:  listing merge, join, lookup hit,    │
/// │           inbound directed message            │
/// │  removes: leave event, lazy expiry on read    │
/// └───────────────────────────────────────────────┘
/// ```
///
/// # Consistency Model
///
/// Entries are hints. A read may return an entity that already left; the
/// owner then logs a delivery failure. Expiry is lazy: an entry older than
/// the TTL is never returned and is removed by the read that finds it.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct DirectoryCache {
    entries: Arc<DashMap<NameKey, DirectoryEntry>>,
    ttl: Duration,
}

impl DirectoryCache {
    /// Create an empty cache whose entries live for `ttl` without activity.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Configured time to live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or refresh an entry.
    pub fn upsert(&self, name: &str, entity_id: EntityId, node: &NodeId) {
        self.entries.insert(
            NameKey::new(name),
            DirectoryEntry {
                name: name.to_string(),
                entity_id,
                node: node.clone(),
                last_seen: Instant::now(),
            },
        );
    }

    /// Merge a node's full listing, stamping every entry with `now`.
    pub fn merge_listing<I>(&self, node: &NodeId, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, EntityId)>,
    {
        let mut merged = 0;
        for (name, entity_id) in entries {
            self.upsert(&name, entity_id, node);
            merged += 1;
        }
        merged
    }

    /// Remove `name` if it is recorded on `node`.
    ///
    /// A leave event from a node that no longer owns the name (the entity
    /// already reconnected elsewhere) is ignored.
    pub fn remove(&self, name: &str, node: &NodeId) -> bool {
        self.entries
            .remove_if(&NameKey::new(name), |_, e| &e.node == node)
            .is_some()
    }

    /// Live entry for `name`.
    pub fn get(&self, name: &str) -> Option<DirectoryEntry> {
        let key = NameKey::new(name);
        let now = Instant::now();
        match self.entries.get(&key) {
            Some(entry) if !entry.is_expired(now, self.ttl) => return Some(entry.value().clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries
            .remove_if(&key, |_, e| e.is_expired(now, self.ttl));
        None
    }

    /// Live entry for `entity_id`.
    pub fn find_by_id(&self, entity_id: EntityId) -> Option<DirectoryEntry> {
        let now = Instant::now();
        self.entries
            .iter()
            .find(|e| e.entity_id == entity_id && !e.is_expired(now, self.ttl))
            .map(|e| e.value().clone())
    }

    /// Names of live entries starting with `prefix`, ignoring case.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.purge_expired();
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now, self.ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Entries currently stored, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = DirectoryCache::new(Duration::from_secs(300));
        let id = EntityId::random();
        cache.upsert("Alice", id, &node("a"));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get("alice").map(|e| e.entity_id), Some(id));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get("alice").is_none());
        assert!(cache.is_empty(), "expired entry is removed by the read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_refreshes_ttl() {
        let cache = DirectoryCache::new(Duration::from_secs(10));
        let id = EntityId::random();
        cache.upsert("bob", id, &node("a"));

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.upsert("Bob", id, &node("b"));
        tokio::time::advance(Duration::from_secs(8)).await;

        let entry = cache.get("BOB").expect("refreshed");
        assert_eq!(entry.node, node("b"));
        assert_eq!(entry.name, "Bob");
    }

    #[tokio::test]
    async fn test_remove_requires_matching_node() {
        let cache = DirectoryCache::new(Duration::from_secs(60));
        cache.upsert("carol", EntityId::random(), &node("b"));

        assert!(!cache.remove("carol", &node("a")));
        assert!(cache.get("carol").is_some());
        assert!(cache.remove("CAROL", &node("b")));
        assert!(cache.get("carol").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_listing_skips_expired() {
        let cache = DirectoryCache::new(Duration::from_secs(10));
        cache.upsert("Steve", EntityId::random(), &node("a"));
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.merge_listing(
            &node("b"),
            vec![
                ("Stella".to_string(), EntityId::random()),
                ("Max".to_string(), EntityId::random()),
            ],
        );

        assert_eq!(cache.names_with_prefix("st"), vec!["Stella".to_string()]);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let cache = DirectoryCache::new(Duration::from_secs(60));
        let id = EntityId::random();
        cache.upsert("dave", id, &node("c"));
        assert_eq!(cache.find_by_id(id).map(|e| e.name), Some("dave".to_string()));
        assert!(cache.find_by_id(EntityId::random()).is_none());
    }
}
