//! # crosslink
//!
//! Cross-node staff chat, presence activity and directed messages for a
//! fleet of nodes sharing one pub/sub broker.
//!
//! Each node hosts a set of connected entities (players, users, agents).
//! crosslink lets them talk across node boundaries:
//!
//! - **Broadcast**: staff chat and presence activity shown to capability
//!   holders on every node ([`broadcast`])
//! - **Lookup**: correlated request/response to find which node holds a
//!   name ([`lookup`])
//! - **Directory**: TTL cache of remote entities kept warm by listings and
//!   join/leave announcements ([`directory`])
//! - **Directed delivery**: private messages with reply links, social spy,
//!   message toggles and ignore lists ([`delivery`], [`state`])
//!
//! Envelopes travel as JSON over [`crosslink_transport`]. The host plugs in
//! its sessions through [`SessionProvider`] and, optionally, a
//! [`ContentPolicy`].
//!
//! # Example
//!
//! ```rust,ignore
//! let sessions = Arc::new(InMemorySessions::new());
//! let config = CrosslinkConfig::load("crosslink.toml")?;
//! let node = NodeBuilder::new(config.clone(), sessions.clone())
//!     .build(RedisBroker::new(config.broker))?;
//!
//! if !node.start().await {
//!     // broker unreachable, local-only from here on
//! }
//! node.broadcast_console_chat("server restarting in 5 minutes");
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

pub mod broadcast;
pub mod config;
pub mod delivery;
pub mod directory;
pub mod error;
pub mod lookup;
pub mod node;
pub mod protocol;
pub mod session;
pub mod state;
pub mod template;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use broadcast::BroadcastService;
pub use config::{CrosslinkConfig, PrivateMessagesConfig, StaffChatConfig};
pub use delivery::{DirectedDelivery, RejectReason, SendOutcome};
pub use directory::{DirectoryCache, DirectoryEntry, DirectorySync};
pub use error::{ConfigError, ProtocolError};
pub use lookup::{LookupFuture, LookupResult, LookupService};
pub use node::{Node, NodeBuilder};
pub use protocol::{ChatSource, Envelope, Payload, PresenceKind};
pub use session::{
    AllowAll, ContentPolicy, InMemorySessions, LocalEntity, PolicyVerdict, SessionProvider,
};
pub use state::{MessagingState, ReplyLink};

pub use crosslink_core::{CorrelationId, EntityId, NodeId};
