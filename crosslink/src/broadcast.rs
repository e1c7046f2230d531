//! Staff chat and presence activity.
//!
//! Outbound lines are shown to capability holders on this node right away
//! and published for every other node. Inbound lines from other nodes are
//! rendered with the same templates and shown to the local holders of the
//! matching capability. A node never receives its own lines back: the
//! dispatcher drops broadcasts whose origin is this node.

use std::sync::Arc;

use crosslink_core::NodeId;
use crosslink_transport::PublishHandle;
use tracing::info;

use crate::config::StaffChatConfig;
use crate::protocol::{ChatSource, Outbox, Payload, PresenceKind};
use crate::session::{LocalEntity, SessionProvider};
use crate::state::MessagingState;
use crate::template::render;

/// Name and location used for console chat.
pub const CONSOLE_NAME: &str = "Console";

/// Publishes and renders staff chat and presence activity.
#[derive(Clone)]
pub struct BroadcastService {
    outbox: Outbox,
    sessions: Arc<dyn SessionProvider>,
    config: Arc<StaffChatConfig>,
}

impl BroadcastService {
    /// Create the service.
    pub fn new(outbox: Outbox, sessions: Arc<dyn SessionProvider>, config: StaffChatConfig) -> Self {
        Self {
            outbox,
            sessions,
            config: Arc::new(config),
        }
    }

    /// Staff chat from a connected entity.
    pub fn broadcast_chat(&self, sender: &LocalEntity, message: &str) -> PublishHandle {
        self.chat(ChatSource::Entity, &sender.name, &sender.location, message)
    }

    /// Staff chat from this node's console.
    pub fn broadcast_console_chat(&self, message: &str) -> PublishHandle {
        self.chat(ChatSource::Console, CONSOLE_NAME, CONSOLE_NAME, message)
    }

    /// Staff chat relayed from an external chat service.
    pub fn broadcast_relay_chat(&self, user: &str, message: &str) -> PublishHandle {
        self.chat(ChatSource::Relay, user, &self.config.relay_label, message)
    }

    /// Ordinary chat from `sender`. Taken over as staff chat when `sender`
    /// has staff chat mode on and may use staff chat; `None` means the host
    /// shows the line as usual.
    pub fn route_entity_chat(
        &self,
        state: &MessagingState,
        sender: &LocalEntity,
        message: &str,
    ) -> Option<PublishHandle> {
        if !self.config.enabled || !state.in_staff_chat_mode(sender.id) {
            return None;
        }
        if !self.sessions.has_capability(sender.id, &self.config.chat_capability) {
            return None;
        }
        Some(self.broadcast_chat(sender, message))
    }

    /// Presence change of a local entity.
    pub fn broadcast_presence(&self, entity: &LocalEntity, activity: PresenceKind) -> PublishHandle {
        if !self.config.enabled {
            return PublishHandle::ready(false);
        }
        let line = self.render_presence_line(self.outbox.node_id(), &entity.name, &activity);
        self.fan_out(&self.config.activity_capability, &line);
        self.outbox.broadcast(
            &self.config.activity_channel,
            Payload::PresenceActivity {
                entity_name: entity.name.clone(),
                activity,
            },
        )
    }

    /// Render a chat line with the configured template. `node` is the node
    /// the line was sent from.
    pub fn render_chat_line(
        &self,
        node: &NodeId,
        sender_name: &str,
        location: &str,
        message: &str,
    ) -> String {
        render(
            &self.config.chat_format,
            &[
                ("prefix", self.config.prefix.as_str()),
                ("node", node.as_str()),
                ("location", location),
                ("name", sender_name),
                ("message", message),
            ],
        )
    }

    /// Render a presence line with the configured templates.
    pub fn render_presence_line(
        &self,
        node: &NodeId,
        entity_name: &str,
        activity: &PresenceKind,
    ) -> String {
        let prefix = self.config.prefix.as_str();
        let node = node.as_str();
        match activity {
            PresenceKind::Connect => render(
                &self.config.connect_format,
                &[("prefix", prefix), ("node", node), ("name", entity_name)],
            ),
            PresenceKind::Disconnect => render(
                &self.config.disconnect_format,
                &[("prefix", prefix), ("node", node), ("name", entity_name)],
            ),
            PresenceKind::Switch { from, to } => render(
                &self.config.switch_format,
                &[
                    ("prefix", prefix),
                    ("node", node),
                    ("name", entity_name),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ],
            ),
        }
    }

    /// Show a chat line from another node.
    pub fn handle_chat(
        &self,
        origin: &NodeId,
        source: ChatSource,
        sender_name: &str,
        location: &str,
        message: &str,
    ) {
        let line = self.render_chat_line(origin, sender_name, location, message);
        info!(%origin, ?source, sender = %sender_name, "{line}");
        self.fan_out(&self.config.chat_capability, &line);
    }

    /// Show a presence change from another node.
    pub fn handle_presence(&self, origin: &NodeId, entity_name: &str, activity: &PresenceKind) {
        let line = self.render_presence_line(origin, entity_name, activity);
        info!(%origin, entity = %entity_name, "{line}");
        self.fan_out(&self.config.activity_capability, &line);
    }

    fn chat(&self, source: ChatSource, sender_name: &str, location: &str, message: &str) -> PublishHandle {
        if !self.config.enabled {
            return PublishHandle::ready(false);
        }
        let line = self.render_chat_line(self.outbox.node_id(), sender_name, location, message);
        self.fan_out(&self.config.chat_capability, &line);
        self.outbox.broadcast(
            &self.config.chat_channel,
            Payload::ChatBroadcast {
                source,
                sender_name: sender_name.to_string(),
                location: location.to_string(),
                message: message.to_string(),
            },
        )
    }

    fn fan_out(&self, capability: &str, line: &str) -> usize {
        self.sessions
            .local_entities()
            .into_iter()
            .filter(|e| self.sessions.has_capability(e.id, capability))
            .filter(|e| self.sessions.deliver(e.id, line))
            .count()
    }
}
