//! Node facade: wires the transport, protocol and services together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Node<B>                                                      │
//! │                                                              │
//! │  BroadcastService   LookupService   DirectedDelivery         │
//! │        │                 │                │   DirectorySync  │
//! │        └────────┬────────┴────────┬───────┘        │         │
//! │                 ▼                 ▲                │         │
//! │              Outbox          Dispatcher ×2 ◄───────┘         │
//! │                 │         (staff, messaging)                 │
//! │                 ▼                 ▲                          │
//! │           PubSubTransport<B> ─────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A node that fails to reach the broker in [`Node::start`] keeps working
//! locally: staff chat reaches local staff, directed messages reach local
//! entities, and everything cross-node reports failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crosslink_core::NodeId;
use crosslink_transport::{Broker, MetricsSnapshot, PubSubTransport, PublishHandle, SubscriptionHandle};
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastService;
use crate::config::CrosslinkConfig;
use crate::delivery::{DirectedDelivery, SendOutcome};
use crate::directory::{DirectoryCache, DirectorySync};
use crate::error::ConfigError;
use crate::lookup::{LookupFuture, LookupService};
use crate::protocol::{Dispatcher, Outbox, PresenceKind, ProtocolGroup, Routes};
use crate::session::{AllowAll, ContentPolicy, LocalEntity, SessionProvider};
use crate::state::MessagingState;

/// Builds a [`Node`].
///
/// # Example
///
/// ```rust,ignore
/// let node = NodeBuilder::new(config, sessions)
///     .policy(Arc::new(MyFilter))
///     .build(RedisBroker::new(config.broker.clone()))?;
/// node.start().await;
/// ```
pub struct NodeBuilder {
    config: CrosslinkConfig,
    sessions: Arc<dyn SessionProvider>,
    policy: Arc<dyn ContentPolicy>,
}

impl NodeBuilder {
    /// Start from a config and the host's session provider.
    pub fn new(config: CrosslinkConfig, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            config,
            sessions,
            policy: Arc::new(AllowAll),
        }
    }

    /// Screen directed message text with `policy`.
    pub fn policy(mut self, policy: Arc<dyn ContentPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Validate the config and assemble the node. Nothing connects yet.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` when the config fails validation.
    pub fn build<B: Broker>(self, broker: B) -> Result<Node<B>, ConfigError> {
        self.config.validate()?;

        let node_id = self.config.node_id();
        let transport = PubSubTransport::new(broker, self.config.pool.clone());
        let outbox = Outbox::new(node_id.clone(), Arc::new(transport.clone()));
        let state = MessagingState::new();
        let pm = &self.config.private_messages;
        let cache = DirectoryCache::new(pm.directory_ttl());

        let lookup = LookupService::new(outbox.clone(), self.sessions.clone(), cache.clone(), pm);
        let routes = Routes {
            broadcast: BroadcastService::new(
                outbox.clone(),
                self.sessions.clone(),
                self.config.staff_chat.clone(),
            ),
            directory: DirectorySync::new(outbox.clone(), self.sessions.clone(), cache.clone(), pm),
            delivery: DirectedDelivery::new(
                outbox.clone(),
                self.sessions.clone(),
                self.policy,
                state.clone(),
                cache,
                lookup.clone(),
                pm.clone(),
            ),
            lookup,
            outbox,
        };

        Ok(Node {
            node_id,
            config: self.config,
            transport,
            routes,
            state,
            started: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        })
    }
}

/// One member of the network.
pub struct Node<B: Broker> {
    node_id: NodeId,
    config: CrosslinkConfig,
    transport: PubSubTransport<B>,
    routes: Routes,
    state: MessagingState,
    started: AtomicBool,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl<B: Broker> Node<B> {
    /// Connect to the broker and subscribe every enabled protocol group.
    ///
    /// Returns `false` when the broker is unreachable; the node then runs
    /// local-only for the rest of the process. Only the first call does
    /// anything; later calls report whether the node is connected.
    pub async fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(node = %self.node_id, "node already started");
            return self.is_connected();
        }
        if !self.transport.initialize().await {
            warn!(node = %self.node_id, "running without cross-node messaging");
            return false;
        }

        let mut groups = Vec::new();
        if self.config.staff_chat.enabled {
            let sc = &self.config.staff_chat;
            groups.push((
                ProtocolGroup::StaffChat,
                vec![sc.chat_channel.clone(), sc.activity_channel.clone()],
            ));
        }
        if self.config.private_messages.enabled {
            let pm = &self.config.private_messages;
            groups.push((
                ProtocolGroup::PrivateMessages,
                vec![
                    pm.message_channel.clone(),
                    pm.lookup_channel.clone(),
                    pm.lookup_response_channel.clone(),
                    pm.social_spy_channel.clone(),
                    pm.reply_channel.clone(),
                ],
            ));
        }

        let mut handles = Vec::new();
        for (group, channels) in groups {
            let dispatcher = Arc::new(Dispatcher::new(group, self.routes.clone()));
            match self.transport.subscribe(dispatcher, channels) {
                Some(handle) => handles.push(handle),
                None => {
                    warn!(node = %self.node_id, ?group, "could not subscribe, running without cross-node messaging");
                    for handle in &handles {
                        handle.unsubscribe();
                    }
                    self.transport.shutdown();
                    return false;
                }
            }
        }
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
        info!(node = %self.node_id, "node started");
        true
    }

    /// This node's id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Whether the broker is reachable and shutdown has not started.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Find the node holding `name`.
    pub fn lookup(&self, name: &str) -> LookupFuture {
        self.routes.lookup.lookup(name)
    }

    /// Send a directed message.
    pub async fn send_directed(&self, sender: &LocalEntity, target_name: &str, text: &str) -> SendOutcome {
        self.routes.delivery.send(sender, target_name, text).await
    }

    /// Answer `sender`'s last interlocutor.
    pub async fn reply(&self, sender: &LocalEntity, text: &str) -> SendOutcome {
        self.routes.delivery.reply(sender, text).await
    }

    /// Staff chat from a local entity.
    pub fn broadcast_chat(&self, sender: &LocalEntity, message: &str) -> PublishHandle {
        self.routes.broadcast.broadcast_chat(sender, message)
    }

    /// Staff chat from this node's console.
    pub fn broadcast_console_chat(&self, message: &str) -> PublishHandle {
        self.routes.broadcast.broadcast_console_chat(message)
    }

    /// Staff chat relayed from an external chat service.
    pub fn broadcast_relay_chat(&self, user: &str, message: &str) -> PublishHandle {
        self.routes.broadcast.broadcast_relay_chat(user, message)
    }

    /// Ordinary chat from a local entity. `Some` when it went to staff chat
    /// instead; the host then suppresses the public line.
    pub fn route_chat(&self, sender: &LocalEntity, message: &str) -> Option<PublishHandle> {
        self.routes
            .broadcast
            .route_entity_chat(&self.state, sender, message)
    }

    /// Presence change of a local entity.
    pub fn broadcast_presence(&self, entity: &LocalEntity, activity: PresenceKind) -> PublishHandle {
        self.routes.broadcast.broadcast_presence(entity, activity)
    }

    /// Tell the network `entity` connected here.
    pub fn announce_join(&self, entity: &LocalEntity) -> PublishHandle {
        if !self.config.private_messages.enabled {
            return PublishHandle::ready(false);
        }
        self.routes.directory.announce_join(entity)
    }

    /// Tell the network `entity` left, and forget its session state here.
    pub fn announce_leave(&self, entity: &LocalEntity) -> PublishHandle {
        self.state.handle_disconnect(entity.id);
        if !self.config.private_messages.enabled {
            return PublishHandle::ready(false);
        }
        self.routes.directory.announce_leave(entity)
    }

    /// Names starting with `prefix` across the network.
    pub fn complete_names(&self, prefix: &str) -> Vec<String> {
        self.routes.directory.complete_names(prefix)
    }

    /// Reply links, social spy, toggles, staff chat mode and ignores.
    pub fn messaging(&self) -> &MessagingState {
        &self.state
    }

    /// Cache of remote entities.
    pub fn directory(&self) -> &DirectoryCache {
        self.routes.directory.cache()
    }

    /// Transport counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.transport.metrics()
    }

    /// Lookups still waiting for an answer.
    pub fn pending_lookups(&self) -> usize {
        self.routes.lookup.pending_count()
    }

    /// Stop the node: pending lookups resolve `NotFound`, subscriptions end
    /// and the pool closes. Idempotent.
    pub fn shutdown(&self) {
        let drained = self.routes.lookup.shutdown();
        let subscriptions: Vec<SubscriptionHandle> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        self.transport.shutdown();
        info!(node = %self.node_id, drained, "node stopped");
    }
}
