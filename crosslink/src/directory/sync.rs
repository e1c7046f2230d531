//! Directory exchange between nodes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crosslink_core::{EntityId, NameKey, NodeId};
use crosslink_transport::PublishHandle;
use tracing::{debug, trace};

use super::DirectoryCache;
use crate::config::PrivateMessagesConfig;
use crate::protocol::{ListedEntity, Outbox, Payload};
use crate::session::{LocalEntity, SessionProvider};

/// Keeps the [`DirectoryCache`] in step with the rest of the network.
///
/// Requests and announcements travel on the lookup channel; listings are
/// answered on the lookup response channel, addressed to the requester.
#[derive(Clone)]
pub struct DirectorySync {
    outbox: Outbox,
    sessions: Arc<dyn SessionProvider>,
    cache: DirectoryCache,
    request_channel: String,
    response_channel: String,
}

impl DirectorySync {
    /// Create the exchange over `cache`.
    pub fn new(
        outbox: Outbox,
        sessions: Arc<dyn SessionProvider>,
        cache: DirectoryCache,
        config: &PrivateMessagesConfig,
    ) -> Self {
        Self {
            outbox,
            sessions,
            cache,
            request_channel: config.lookup_channel.clone(),
            response_channel: config.lookup_response_channel.clone(),
        }
    }

    /// The cache this exchange maintains.
    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Ask every peer for its full listing.
    pub fn request_listing(&self) -> PublishHandle {
        debug!("requesting directory listings");
        self.outbox
            .broadcast(&self.request_channel, Payload::DirectoryListRequest)
    }

    /// Tell peers that `entity` connected here.
    pub fn announce_join(&self, entity: &LocalEntity) -> PublishHandle {
        self.outbox.broadcast(
            &self.request_channel,
            Payload::DirectoryJoin {
                name: entity.name.clone(),
                entity_id: entity.id,
            },
        )
    }

    /// Tell peers that `entity` left this node.
    pub fn announce_leave(&self, entity: &LocalEntity) -> PublishHandle {
        self.outbox.broadcast(
            &self.request_channel,
            Payload::DirectoryLeave {
                name: entity.name.clone(),
                entity_id: entity.id,
            },
        )
    }

    /// Answer a peer's listing request with every local entity.
    pub fn handle_list_request(&self, origin: &NodeId) {
        let entries: Vec<ListedEntity> = self
            .sessions
            .local_entities()
            .into_iter()
            .map(|e| ListedEntity {
                name: e.name,
                entity_id: e.id,
            })
            .collect();
        trace!(%origin, count = entries.len(), "answering directory listing");
        drop(self.outbox.send_to(
            &self.response_channel,
            origin,
            Payload::DirectoryListResponse { entries },
        ));
    }

    /// Merge a peer's listing.
    pub fn handle_list_response(&self, origin: &NodeId, entries: Vec<ListedEntity>) {
        let merged = self
            .cache
            .merge_listing(origin, entries.into_iter().map(|e| (e.name, e.entity_id)));
        debug!(%origin, merged, "merged directory listing");
    }

    /// Record a peer's join announcement.
    pub fn handle_join(&self, origin: &NodeId, name: &str, entity_id: EntityId) {
        trace!(%origin, %name, "directory join");
        self.cache.upsert(name, entity_id, origin);
    }

    /// Record a peer's leave announcement.
    pub fn handle_leave(&self, origin: &NodeId, name: &str) {
        if !self.cache.remove(name, origin) {
            trace!(%origin, %name, "leave for entity not recorded on that node");
        }
    }

    /// Names starting with `prefix` across the network, ignoring case.
    ///
    /// Local entities come first in precedence; each name appears once.
    /// The result is sorted case-insensitively.
    pub fn complete_names(&self, prefix: &str) -> Vec<String> {
        let mut names: BTreeMap<NameKey, String> = BTreeMap::new();
        for entity in self.sessions.local_entities() {
            let key = NameKey::new(&entity.name);
            if key.starts_with(prefix) {
                names.insert(key, entity.name);
            }
        }
        for name in self.cache.names_with_prefix(prefix) {
            names.entry(NameKey::new(&name)).or_insert(name);
        }
        names.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::testing::outbox;
    use crate::session::InMemorySessions;

    fn sync(node: &str) -> (
        DirectorySync,
        Arc<crate::protocol::testing::RecordingPublisher>,
        Arc<InMemorySessions>,
    ) {
        let (outbox, publisher) = outbox(node);
        let sessions = Arc::new(InMemorySessions::new());
        let sync = DirectorySync::new(
            outbox,
            sessions.clone(),
            DirectoryCache::new(Duration::from_secs(300)),
            &PrivateMessagesConfig::default(),
        );
        (sync, publisher, sessions)
    }

    #[tokio::test]
    async fn test_list_request_is_answered_to_origin() {
        let (sync, publisher, sessions) = sync("a");
        let id = EntityId::random();
        sessions.connect(LocalEntity::new(id, "Alice", "hub"), &[]);

        sync.handle_list_request(&NodeId::new("b"));

        let sent = publisher.take();
        assert_eq!(sent.len(), 1);
        let (channel, envelope) = &sent[0];
        assert_eq!(channel, "crosslink:pm:lookup-response");
        assert_eq!(envelope.target_node, Some(NodeId::new("b")));
        assert_eq!(
            envelope.payload,
            Payload::DirectoryListResponse {
                entries: vec![ListedEntity {
                    name: "Alice".to_string(),
                    entity_id: id
                }]
            }
        );
    }

    #[tokio::test]
    async fn test_join_leave_and_listing() {
        let (sync, _publisher, _sessions) = sync("a");
        let (b, c) = (NodeId::new("b"), NodeId::new("c"));
        let id = EntityId::random();

        sync.handle_list_response(
            &b,
            vec![ListedEntity {
                name: "Bob".to_string(),
                entity_id: EntityId::random(),
            }],
        );
        sync.handle_join(&c, "Carol", id);
        assert_eq!(sync.cache().get("carol").map(|e| e.node), Some(c.clone()));

        sync.handle_leave(&b, "carol");
        assert!(sync.cache().get("carol").is_some());
        sync.handle_leave(&c, "carol");
        assert!(sync.cache().get("carol").is_none());
        assert!(sync.cache().get("bob").is_some());
    }

    #[tokio::test]
    async fn test_complete_names_merges_local_and_remote() {
        let (sync, _publisher, sessions) = sync("a");
        sessions.connect(LocalEntity::new(EntityId::random(), "Steve", "hub"), &[]);
        sessions.connect(LocalEntity::new(EntityId::random(), "Max", "hub"), &[]);
        sync.handle_join(&NodeId::new("b"), "stella", EntityId::random());
        sync.handle_join(&NodeId::new("b"), "STEVE", EntityId::random());

        assert_eq!(
            sync.complete_names("St"),
            vec!["stella".to_string(), "Steve".to_string()]
        );
        assert_eq!(sync.complete_names("").len(), 3);
    }

    #[tokio::test]
    async fn test_announcements_go_on_request_channel() {
        let (sync, publisher, _) = sync("a");
        let entity = LocalEntity::new(EntityId::random(), "Dana", "hub");

        assert!(sync.announce_join(&entity).await);
        assert!(sync.announce_leave(&entity).await);
        assert!(sync.request_listing().await);

        let kinds: Vec<_> = publisher
            .take()
            .into_iter()
            .map(|(channel, env)| {
                assert_eq!(channel, "crosslink:pm:lookup");
                env.payload.kind()
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["directory_join", "directory_leave", "directory_list_request"]
        );
    }
}
