//! Envelope wire format.
//!
//! One JSON object per message. Header fields sit next to the payload
//! fields and `type` selects the payload:
//!
//! ```text
//! {"type":"lookup_request","origin_node":"hub","correlation_id":"6f1c…","timestamp":1700000000000,"name":"alice"}
//! {"type":"lookup_response","origin_node":"survival","target_node":"hub","correlation_id":"6f1c…",
//!  "timestamp":1700000000012,"name":"Alice","found":true,"entity_id":"0b7e…"}
//! ```
//!
//! Unknown `type` values, missing fields and non-JSON payloads fail to
//! decode; the dispatcher logs and drops them.

use crosslink_core::{unix_millis, CorrelationId, EntityId, NodeId};
use serde::{Deserialize, Serialize};

/// How a receiving node decides whether an envelope is meant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Seen by every node; the originating node drops its own echo.
    Broadcast,
    /// Acted on only by the node named in `target_node`.
    Targeted,
}

/// Protocol group a payload belongs to; each group has its own enable flag
/// and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGroup {
    /// Staff chat and presence activity.
    StaffChat,
    /// Directed messages, lookups, reply links, social spy, directory.
    PrivateMessages,
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Node that published the envelope.
    pub origin_node: NodeId,
    /// Addressee of targeted envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<NodeId>,
    /// Pairs lookup requests with responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Unix milliseconds at publish time. Informational only.
    pub timestamp: u64,
    /// Type tag and type-specific fields.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    /// A broadcast envelope from `origin`.
    pub fn new(origin: NodeId, payload: Payload) -> Self {
        Self {
            origin_node: origin,
            target_node: None,
            correlation_id: None,
            timestamp: unix_millis(),
            payload,
        }
    }

    /// Address the envelope to `target`.
    pub fn to(mut self, target: NodeId) -> Self {
        self.target_node = Some(target);
        self
    }

    /// Attach a correlation id.
    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Whether the node `local` should act on this envelope.
    ///
    /// Broadcasts are dropped by their own origin; targeted envelopes are
    /// dropped by everyone but the target.
    pub fn is_for(&self, local: &NodeId) -> bool {
        match self.payload.routing() {
            Routing::Broadcast => &self.origin_node != local,
            Routing::Targeted => self.target_node.as_ref() == Some(local),
        }
    }
}

/// Where a chat broadcast came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSource {
    /// A connected staff entity.
    Entity,
    /// The node console.
    Console,
    /// An external chat service relayed into the network.
    Relay,
}

/// Presence change of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresenceKind {
    /// Joined the network.
    Connect,
    /// Left the network.
    Disconnect,
    /// Moved between locations.
    Switch {
        /// Previous location.
        from: String,
        /// New location.
        to: String,
    },
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedEntity {
    /// Display name.
    pub name: String,
    /// Stable id.
    pub entity_id: EntityId,
}

/// Closed set of envelope payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Staff chat line.
    ChatBroadcast {
        /// Who spoke.
        source: ChatSource,
        /// Speaker name (`Console` or the relay user for non-entities).
        sender_name: String,
        /// Speaker location on the origin node.
        location: String,
        /// Chat text.
        message: String,
    },
    /// Entity joined, left or moved.
    PresenceActivity {
        /// Entity name.
        entity_name: String,
        /// What happened.
        activity: PresenceKind,
    },
    /// Who holds `name`?
    LookupRequest {
        /// Name being searched, any case.
        name: String,
    },
    /// Answer to a lookup request.
    LookupResponse {
        /// Name as searched, or the display name when found.
        name: String,
        /// Whether the responder holds the entity.
        found: bool,
        /// Id of the entity when found.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<EntityId>,
    },
    /// Message for an entity on the target node.
    DirectedMessage {
        /// Sender id.
        sender_id: EntityId,
        /// Sender display name.
        sender_name: String,
        /// Recipient name as resolved.
        recipient_name: String,
        /// Message text.
        message: String,
    },
    /// Point `entity_id`'s reply link at `reply_to`.
    ReplyLinkUpdate {
        /// Entity on the target node whose link changes.
        entity_id: EntityId,
        /// New interlocutor.
        reply_to: EntityId,
        /// New interlocutor's name.
        reply_to_name: String,
    },
    /// Copy of a delivered directed message for spies on other nodes.
    SocialSpy {
        /// Sender id.
        sender_id: EntityId,
        /// Sender name.
        sender_name: String,
        /// Node the sender is on.
        sender_node: NodeId,
        /// Recipient id.
        recipient_id: EntityId,
        /// Recipient name.
        recipient_name: String,
        /// Message text.
        message: String,
    },
    /// An entity connected to the origin node.
    DirectoryJoin {
        /// Display name.
        name: String,
        /// Stable id.
        entity_id: EntityId,
    },
    /// An entity left the origin node.
    DirectoryLeave {
        /// Display name.
        name: String,
        /// Stable id.
        entity_id: EntityId,
    },
    /// Ask every node for its full entity list.
    DirectoryListRequest,
    /// Full entity list of the origin node.
    DirectoryListResponse {
        /// Every entity connected to the origin node.
        entries: Vec<ListedEntity>,
    },
}

impl Payload {
    /// Routing class of this payload.
    pub fn routing(&self) -> Routing {
        match self {
            Payload::ChatBroadcast { .. }
            | Payload::PresenceActivity { .. }
            | Payload::LookupRequest { .. }
            | Payload::SocialSpy { .. }
            | Payload::DirectoryJoin { .. }
            | Payload::DirectoryLeave { .. }
            | Payload::DirectoryListRequest => Routing::Broadcast,
            Payload::LookupResponse { .. }
            | Payload::DirectedMessage { .. }
            | Payload::ReplyLinkUpdate { .. }
            | Payload::DirectoryListResponse { .. } => Routing::Targeted,
        }
    }

    /// Protocol group of this payload.
    pub fn group(&self) -> ProtocolGroup {
        match self {
            Payload::ChatBroadcast { .. } | Payload::PresenceActivity { .. } => {
                ProtocolGroup::StaffChat
            }
            _ => ProtocolGroup::PrivateMessages,
        }
    }

    /// Wire `type` value, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::ChatBroadcast { .. } => "chat_broadcast",
            Payload::PresenceActivity { .. } => "presence_activity",
            Payload::LookupRequest { .. } => "lookup_request",
            Payload::LookupResponse { .. } => "lookup_response",
            Payload::DirectedMessage { .. } => "directed_message",
            Payload::ReplyLinkUpdate { .. } => "reply_link_update",
            Payload::SocialSpy { .. } => "social_spy",
            Payload::DirectoryJoin { .. } => "directory_join",
            Payload::DirectoryLeave { .. } => "directory_leave",
            Payload::DirectoryListRequest => "directory_list_request",
            Payload::DirectoryListResponse { .. } => "directory_list_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_core::{JsonCodec, MessageCodec};

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_wire_shape_of_lookup_request() {
        let id = CorrelationId::generate();
        let env = Envelope::new(
            node("hub"),
            Payload::LookupRequest {
                name: "alice".to_string(),
            },
        )
        .with_correlation(id);

        let value: serde_json::Value =
            serde_json::from_slice(&JsonCodec.encode(&env).expect("encode")).expect("json");
        assert_eq!(value["type"], "lookup_request");
        assert_eq!(value["origin_node"], "hub");
        assert_eq!(value["name"], "alice");
        assert_eq!(value["correlation_id"], id.to_string());
        assert!(value.get("target_node").is_none());
    }

    #[test]
    fn test_decode_presence_switch() {
        let raw = br#"{
            "type": "presence_activity",
            "origin_node": "survival",
            "timestamp": 1,
            "entity_name": "Steve",
            "activity": {"kind": "switch", "from": "lobby", "to": "arena"}
        }"#;
        let env: Envelope = JsonCodec.decode(raw).expect("decode");
        assert_eq!(env.origin_node, node("survival"));
        assert_eq!(
            env.payload,
            Payload::PresenceActivity {
                entity_name: "Steve".to_string(),
                activity: PresenceKind::Switch {
                    from: "lobby".to_string(),
                    to: "arena".to_string()
                },
            }
        );
    }

    #[test]
    fn test_decode_list_request_without_fields() {
        let raw = br#"{"type":"directory_list_request","origin_node":"a","timestamp":5}"#;
        let env: Envelope = JsonCodec.decode(raw).expect("decode");
        assert_eq!(env.payload, Payload::DirectoryListRequest);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = br#"{"type":"teleport","origin_node":"a","timestamp":5}"#;
        assert!(JsonCodec.decode::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = br#"{"type":"lookup_request","origin_node":"a","timestamp":5}"#;
        assert!(JsonCodec.decode::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_broadcast_routing_drops_own_echo() {
        let env = Envelope::new(
            node("a"),
            Payload::DirectoryJoin {
                name: "x".to_string(),
                entity_id: EntityId::random(),
            },
        );
        assert!(!env.is_for(&node("a")));
        assert!(env.is_for(&node("b")));
    }

    #[test]
    fn test_targeted_routing_only_reaches_target() {
        let env = Envelope::new(
            node("a"),
            Payload::LookupResponse {
                name: "x".to_string(),
                found: false,
                entity_id: None,
            },
        )
        .to(node("b"));
        assert!(env.is_for(&node("b")));
        assert!(!env.is_for(&node("c")));
        assert!(!env.is_for(&node("a")));

        let untargeted = Envelope {
            target_node: None,
            ..env
        };
        assert!(!untargeted.is_for(&node("b")));
    }

    #[test]
    fn test_groups() {
        let chat = Payload::ChatBroadcast {
            source: ChatSource::Console,
            sender_name: "Console".to_string(),
            location: "Console".to_string(),
            message: "hi".to_string(),
        };
        assert_eq!(chat.group(), ProtocolGroup::StaffChat);
        assert_eq!(chat.kind(), "chat_broadcast");
        assert_eq!(
            Payload::DirectoryListRequest.group(),
            ProtocolGroup::PrivateMessages
        );
    }
}
