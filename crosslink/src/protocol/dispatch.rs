//! Inbound side of the envelope protocol.

use crosslink_transport::MessageHandler;
use tracing::{debug, info, trace, warn};

use super::envelope::{Envelope, Payload, ProtocolGroup};
use super::outbox::Outbox;
use crate::broadcast::BroadcastService;
use crate::delivery::DirectedDelivery;
use crate::directory::DirectorySync;
use crate::lookup::LookupService;

/// Services inbound envelopes are routed to.
#[derive(Clone)]
pub(crate) struct Routes {
    pub(crate) outbox: Outbox,
    pub(crate) broadcast: BroadcastService,
    pub(crate) lookup: LookupService,
    pub(crate) directory: DirectorySync,
    pub(crate) delivery: DirectedDelivery,
}

/// Subscription handler for one protocol group.
///
/// Each envelope goes through the same steps:
///
/// ```text
/// bytes ─► decode ──(malformed)──► warn, drop
///            │
///            ▼
///        is_for(local)? ──(own broadcast / other target)──► drop
///            │
///            ▼
///        group matches? ──(no)──► drop
///            │
///            ▼
///        match payload ─► service handler
/// ```
///
/// Nothing here returns an error to the transport; one bad envelope never
/// ends the subscription.
pub struct Dispatcher {
    group: ProtocolGroup,
    routes: Routes,
}

impl Dispatcher {
    pub(crate) fn new(group: ProtocolGroup, routes: Routes) -> Self {
        Self { group, routes }
    }

    /// Group this dispatcher serves.
    pub fn group(&self) -> ProtocolGroup {
        self.group
    }

    fn dispatch(&self, envelope: Envelope) {
        let Envelope {
            origin_node: origin,
            correlation_id,
            payload,
            ..
        } = envelope;
        let r = &self.routes;

        match payload {
            Payload::ChatBroadcast {
                source,
                sender_name,
                location,
                message,
            } => r
                .broadcast
                .handle_chat(&origin, source, &sender_name, &location, &message),
            Payload::PresenceActivity {
                entity_name,
                activity,
            } => r.broadcast.handle_presence(&origin, &entity_name, &activity),
            Payload::LookupRequest { name } => {
                r.lookup.handle_request(&origin, correlation_id, &name)
            }
            Payload::LookupResponse {
                name,
                found,
                entity_id,
            } => r
                .lookup
                .handle_response(&origin, correlation_id, &name, found, entity_id),
            Payload::DirectedMessage {
                sender_id,
                sender_name,
                recipient_name,
                message,
            } => r.delivery.handle_directed(
                &origin,
                sender_id,
                &sender_name,
                &recipient_name,
                &message,
            ),
            Payload::ReplyLinkUpdate {
                entity_id,
                reply_to,
                reply_to_name,
            } => r
                .delivery
                .handle_reply_link_update(&origin, entity_id, reply_to, &reply_to_name),
            Payload::SocialSpy {
                sender_id,
                sender_name,
                sender_node,
                recipient_id,
                recipient_name,
                message,
            } => r.delivery.handle_social_spy(
                &origin,
                sender_id,
                &sender_name,
                &sender_node,
                recipient_id,
                &recipient_name,
                &message,
            ),
            Payload::DirectoryJoin { name, entity_id } => {
                r.directory.handle_join(&origin, &name, entity_id)
            }
            Payload::DirectoryLeave { name, .. } => r.directory.handle_leave(&origin, &name),
            Payload::DirectoryListRequest => r.directory.handle_list_request(&origin),
            Payload::DirectoryListResponse { entries } => {
                r.directory.handle_list_response(&origin, entries)
            }
        }
    }
}

impl MessageHandler for Dispatcher {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        let envelope = match self.routes.outbox.decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%channel, bytes = payload.len(), error = %e, "dropping malformed envelope");
                return;
            }
        };

        if !envelope.is_for(self.routes.outbox.node_id()) {
            trace!(%channel, origin = %envelope.origin_node, kind = envelope.payload.kind(), "envelope not for this node");
            return;
        }
        if envelope.payload.group() != self.group {
            debug!(%channel, kind = envelope.payload.kind(), group = ?self.group, "envelope outside subscribed group");
            return;
        }

        trace!(%channel, origin = %envelope.origin_node, kind = envelope.payload.kind(), "dispatching envelope");
        self.dispatch(envelope);
    }

    fn on_subscribe(&self, channels: &[String]) {
        info!(group = ?self.group, ?channels, "subscribed");
        if self.group == ProtocolGroup::PrivateMessages {
            drop(self.routes.directory.request_listing());
        }
    }

    fn on_unsubscribe(&self, channels: &[String]) {
        info!(group = ?self.group, ?channels, "unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crosslink_core::{CorrelationId, EntityId, JsonCodec, MessageCodec, NodeId};

    use super::*;
    use crate::config::{PrivateMessagesConfig, StaffChatConfig};
    use crate::directory::DirectoryCache;
    use crate::protocol::testing::{outbox, RecordingPublisher};
    use crate::session::{AllowAll, InMemorySessions, LocalEntity};
    use crate::state::MessagingState;

    struct Fixture {
        publisher: Arc<RecordingPublisher>,
        sessions: Arc<InMemorySessions>,
        cache: DirectoryCache,
        routes: Routes,
    }

    fn fixture() -> Fixture {
        let (outbox, publisher) = outbox("a");
        let sessions = Arc::new(InMemorySessions::new());
        let pm = PrivateMessagesConfig::default();
        let cache = DirectoryCache::new(pm.directory_ttl());
        let lookup = LookupService::new(outbox.clone(), sessions.clone(), cache.clone(), &pm);
        let routes = Routes {
            broadcast: BroadcastService::new(outbox.clone(), sessions.clone(), StaffChatConfig::default()),
            directory: DirectorySync::new(outbox.clone(), sessions.clone(), cache.clone(), &pm),
            delivery: DirectedDelivery::new(
                outbox.clone(),
                sessions.clone(),
                Arc::new(AllowAll),
                MessagingState::new(),
                cache.clone(),
                lookup.clone(),
                pm,
            ),
            lookup,
            outbox,
        };
        Fixture {
            publisher,
            sessions,
            cache,
            routes,
        }
    }

    fn bytes(envelope: &Envelope) -> Vec<u8> {
        JsonCodec.encode(envelope).expect("encode")
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_are_dropped() {
        let f = fixture();
        let dispatcher = Dispatcher::new(ProtocolGroup::PrivateMessages, f.routes.clone());

        dispatcher.on_message("crosslink:pm:lookup", b"not json");
        dispatcher.on_message(
            "crosslink:pm:lookup",
            br#"{"type":"teleport","origin_node":"b","timestamp":1}"#,
        );
        dispatcher.on_message("crosslink:pm:lookup", br#"{"type":"lookup_request","origin_node":"b"}"#);

        assert!(f.publisher.take().is_empty());
    }

    #[tokio::test]
    async fn test_own_broadcast_is_ignored() {
        let f = fixture();
        f.sessions
            .connect(LocalEntity::new(EntityId::random(), "Alice", "hub"), &[]);
        let dispatcher = Dispatcher::new(ProtocolGroup::PrivateMessages, f.routes.clone());
        let request = |origin: &str| {
            Envelope::new(
                NodeId::new(origin),
                Payload::LookupRequest {
                    name: "alice".to_string(),
                },
            )
            .with_correlation(CorrelationId::generate())
        };

        dispatcher.on_message("crosslink:pm:lookup", &bytes(&request("a")));
        assert!(f.publisher.take().is_empty());

        dispatcher.on_message("crosslink:pm:lookup", &bytes(&request("b")));
        assert_eq!(f.publisher.take().len(), 1);
    }

    #[tokio::test]
    async fn test_targeted_envelope_for_other_node_is_ignored() {
        let f = fixture();
        let dispatcher = Dispatcher::new(ProtocolGroup::PrivateMessages, f.routes.clone());
        let listing = |target: &str| {
            Envelope::new(
                NodeId::new("b"),
                Payload::DirectoryListResponse {
                    entries: vec![crate::protocol::ListedEntity {
                        name: "Bob".to_string(),
                        entity_id: EntityId::random(),
                    }],
                },
            )
            .to(NodeId::new(target))
        };

        dispatcher.on_message("crosslink:pm:lookup-response", &bytes(&listing("c")));
        assert!(f.cache.is_empty());

        dispatcher.on_message("crosslink:pm:lookup-response", &bytes(&listing("a")));
        assert_eq!(f.cache.get("bob").map(|e| e.node), Some(NodeId::new("b")));
    }

    #[tokio::test]
    async fn test_group_mismatch_is_ignored() {
        let f = fixture();
        let mod_id = EntityId::random();
        f.sessions
            .connect(LocalEntity::new(mod_id, "Mod", "hub"), &["crosslink.staffchat.use"]);
        let dispatcher = Dispatcher::new(ProtocolGroup::PrivateMessages, f.routes.clone());
        let chat = Envelope::new(
            NodeId::new("b"),
            Payload::ChatBroadcast {
                source: crate::protocol::ChatSource::Console,
                sender_name: "Console".to_string(),
                location: "Console".to_string(),
                message: "hi".to_string(),
            },
        );

        dispatcher.on_message("crosslink:pm:lookup", &bytes(&chat));
        assert!(f.sessions.inbox(mod_id).is_empty());

        let staff = Dispatcher::new(ProtocolGroup::StaffChat, f.routes.clone());
        staff.on_message("crosslink:staffchat", &bytes(&chat));
        assert_eq!(f.sessions.inbox(mod_id), vec!["[Staff] [Console] Console » hi".to_string()]);
    }

    #[tokio::test]
    async fn test_messaging_subscription_requests_listing() {
        let f = fixture();
        Dispatcher::new(ProtocolGroup::StaffChat, f.routes.clone()).on_subscribe(&[]);
        assert!(f.publisher.take().is_empty());

        Dispatcher::new(ProtocolGroup::PrivateMessages, f.routes.clone()).on_subscribe(&[]);
        let sent = f.publisher.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.payload, Payload::DirectoryListRequest);
    }
}
