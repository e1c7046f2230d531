//! Node configuration.
//!
//! Loaded from TOML. Every section and field has a default, so a minimal
//! file only needs `node_id`:
//!
//! ```toml
//! node_id = "lobby-1"
//!
//! [broker]
//! host = "10.0.0.5"
//! password = "hunter2"
//!
//! [private_messages]
//! lookup_timeout_ms = 3000
//! ```

use std::path::Path;
use std::time::Duration;

use crosslink_core::NodeId;
use crosslink_transport::{BrokerConfig, PoolConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration of one node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosslinkConfig {
    /// Unique name of this node on the broker.
    pub node_id: String,
    /// Broker address and credentials.
    pub broker: BrokerConfig,
    /// Connection pool sizing.
    pub pool: PoolConfig,
    /// Staff chat and presence broadcasts.
    pub staff_chat: StaffChatConfig,
    /// Directed messages, lookups and the directory.
    pub private_messages: PrivateMessagesConfig,
}

impl CrosslinkConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` when
    /// validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// `ConfigError::Read` when the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Config for `node_id` with every other value defaulted.
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// The node id as a [`NodeId`].
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node_id.clone())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(invalid("node_id must not be empty"));
        }
        self.pool.validate().map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;
        if self.private_messages.lookup_timeout_ms == 0 {
            return Err(invalid("private_messages.lookup_timeout_ms must be positive"));
        }
        if self.private_messages.directory_ttl_ms == 0 {
            return Err(invalid("private_messages.directory_ttl_ms must be positive"));
        }
        let subscriptions = usize::from(self.staff_chat.enabled)
            + usize::from(self.private_messages.enabled);
        if self.pool.max_total <= subscriptions {
            return Err(ConfigError::Invalid {
                message: format!(
                    "pool.max_total ({}) must exceed the {} subscription(s) it has to hold",
                    self.pool.max_total, subscriptions
                ),
            });
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// Staff chat and presence activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffChatConfig {
    /// Subscribe to and publish staff chat and activity.
    pub enabled: bool,
    /// Channel carrying chat broadcasts.
    pub chat_channel: String,
    /// Channel carrying presence activity.
    pub activity_channel: String,
    /// Capability required to see staff chat.
    pub chat_capability: String,
    /// Capability required to see presence activity.
    pub activity_capability: String,
    /// Value of `{prefix}` in every staff template.
    pub prefix: String,
    /// Location shown for messages relayed from an external chat service.
    pub relay_label: String,
    /// Placeholders: `{prefix}` `{node}` `{location}` `{name}` `{message}`.
    pub chat_format: String,
    /// Placeholders: `{prefix}` `{node}` `{name}`.
    pub connect_format: String,
    /// Placeholders: `{prefix}` `{node}` `{name}`.
    pub disconnect_format: String,
    /// Placeholders: `{prefix}` `{node}` `{name}` `{from}` `{to}`.
    pub switch_format: String,
}

impl Default for StaffChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chat_channel: "crosslink:staffchat".to_string(),
            activity_channel: "crosslink:activity".to_string(),
            chat_capability: "crosslink.staffchat.use".to_string(),
            activity_capability: "crosslink.staffchat.activity".to_string(),
            prefix: "[Staff]".to_string(),
            relay_label: "Discord".to_string(),
            chat_format: "{prefix} [{location}] {name} » {message}".to_string(),
            connect_format: "{prefix} {name} joined the network".to_string(),
            disconnect_format: "{prefix} {name} left the network".to_string(),
            switch_format: "{prefix} {name} switched from {from} to {to}".to_string(),
        }
    }
}

/// Directed messages, lookups, reply links and social spy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateMessagesConfig {
    /// Subscribe to and publish the messaging protocol.
    pub enabled: bool,
    /// Channel carrying directed messages.
    pub message_channel: String,
    /// Channel carrying lookup requests and directory events.
    pub lookup_channel: String,
    /// Channel carrying lookup responses and directory listings.
    pub lookup_response_channel: String,
    /// Channel carrying social-spy copies.
    pub social_spy_channel: String,
    /// Channel carrying reply-link updates.
    pub reply_channel: String,
    /// How long a lookup waits for a positive response.
    pub lookup_timeout_ms: u64,
    /// How long a directory entry stays valid without activity.
    pub directory_ttl_ms: u64,
    /// Capability required to receive social-spy copies.
    pub social_spy_capability: String,
    /// Capability that lets a sender reach entities with messages off.
    pub bypass_toggle_capability: String,
    /// Placeholders: `{receiver}` `{message}`.
    pub sender_format: String,
    /// Placeholders: `{sender}` `{message}`.
    pub receiver_format: String,
    /// Placeholders: `{sender}` `{receiver}` `{message}`.
    pub social_spy_format: String,
    /// Placeholders: `{receiver}` `{node}` `{message}`.
    pub cross_sender_format: String,
    /// Placeholders: `{sender}` `{node}` `{message}`.
    pub cross_receiver_format: String,
    /// Placeholders: `{sender}` `{sender_node}` `{receiver}`
    /// `{receiver_node}` `{message}`.
    pub cross_social_spy_format: String,
    /// Sent to an entity messaging itself.
    pub self_message: String,
    /// Placeholder: `{name}`.
    pub player_not_found: String,
    /// Placeholder: `{name}`.
    pub messages_disabled: String,
    /// Placeholder: `{name}`.
    pub ignored: String,
    /// Sent when the content policy rejects a message.
    pub blocked: String,
    /// Sent when `reply` has no target.
    pub no_reply_target: String,
    /// Sent when a message could not be handed to the broker.
    pub unavailable: String,
}

impl Default for PrivateMessagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_channel: "crosslink:pm:message".to_string(),
            lookup_channel: "crosslink:pm:lookup".to_string(),
            lookup_response_channel: "crosslink:pm:lookup-response".to_string(),
            social_spy_channel: "crosslink:pm:socialspy".to_string(),
            reply_channel: "crosslink:pm:reply".to_string(),
            lookup_timeout_ms: 5_000,
            directory_ttl_ms: 300_000,
            social_spy_capability: "crosslink.socialspy".to_string(),
            bypass_toggle_capability: "crosslink.msg.bypass".to_string(),
            sender_format: "[You → {receiver}] {message}".to_string(),
            receiver_format: "[{sender} → You] {message}".to_string(),
            social_spy_format: "[SPY] {sender} → {receiver}: {message}".to_string(),
            cross_sender_format: "[You → {receiver} @ {node}] {message}".to_string(),
            cross_receiver_format: "[{sender} @ {node} → You] {message}".to_string(),
            cross_social_spy_format:
                "[SPY] {sender} @ {sender_node} → {receiver} @ {receiver_node}: {message}"
                    .to_string(),
            self_message: "You cannot message yourself.".to_string(),
            player_not_found: "{name} is not online.".to_string(),
            messages_disabled: "{name} is not accepting messages.".to_string(),
            ignored: "{name} is not accepting messages from you.".to_string(),
            blocked: "Your message was blocked.".to_string(),
            no_reply_target: "You have nobody to reply to.".to_string(),
            unavailable: "Your message could not be sent, try again later.".to_string(),
        }
    }
}

impl PrivateMessagesConfig {
    /// Lookup timeout as a `Duration`.
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Directory TTL as a `Duration`.
    pub fn directory_ttl(&self) -> Duration {
        Duration::from_millis(self.directory_ttl_ms)
    }
}
