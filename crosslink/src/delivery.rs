//! Directed (private) messages between entities.
//!
//! # Architecture
//!
//! ```text
//! sender node                                  owner node
//! ───────────                                  ──────────
//! send(sender, name, text)
//!   self check
//!   local target? ──► deliver_local
//!   policy review
//!   RESOLVE: directory cache, else lookup
//!     └─ miss ──► NotFound
//!   DELIVER: directed_message ─────────────►  handle_directed
//!   echo to sender                              self, toggle, ignore, policy
//!                                               render + deliver
//!                                               own reply link
//!          handle_reply_link_update ◄────────── reply_link_update
//!                                               local spies
//!   spies on every other node ◄──────────────── social_spy (broadcast)
//! ```
//!
//! There is no acknowledgment from the owner. `Dispatched` means the owner
//! was found and the envelope was published, nothing more. Failures on the
//! owner side are logged there and never reported back.

use std::sync::Arc;

use crosslink_core::{EntityId, NameKey, NodeId};
use tracing::{debug, info, warn};

use crate::config::PrivateMessagesConfig;
use crate::directory::DirectoryCache;
use crate::lookup::{LookupResult, LookupService};
use crate::protocol::{Outbox, Payload};
use crate::session::{ContentPolicy, LocalEntity, PolicyVerdict, SessionProvider};
use crate::state::MessagingState;
use crate::template::render;

/// Why a directed message was refused before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Sender named itself.
    SelfTarget,
    /// Recipient turned messages off.
    MessagesDisabled,
    /// Recipient ignores the sender.
    Ignored,
    /// Content policy refused the text.
    ContentBlocked,
    /// `reply` without a reply link.
    NoReplyTarget,
}

/// Outcome of [`DirectedDelivery::send`] as seen by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Recipient is on this node and got the message.
    DeliveredLocally,
    /// Envelope published to the owning node.
    Dispatched {
        /// Owning node.
        node: NodeId,
    },
    /// No node holds the recipient.
    NotFound,
    /// Refused before dispatch.
    Rejected(RejectReason),
    /// Transport down or publish failed.
    Unavailable,
}

struct Inner {
    outbox: Outbox,
    sessions: Arc<dyn SessionProvider>,
    policy: Arc<dyn ContentPolicy>,
    state: MessagingState,
    directory: DirectoryCache,
    lookup: LookupService,
    config: PrivateMessagesConfig,
}

/// Sends directed messages and handles the owner side of the exchange.
#[derive(Clone)]
pub struct DirectedDelivery {
    inner: Arc<Inner>,
}

/// A remote recipient once resolved.
struct Resolved {
    node: NodeId,
    name: String,
}

impl DirectedDelivery {
    /// Create the service.
    pub fn new(
        outbox: Outbox,
        sessions: Arc<dyn SessionProvider>,
        policy: Arc<dyn ContentPolicy>,
        state: MessagingState,
        directory: DirectoryCache,
        lookup: LookupService,
        config: PrivateMessagesConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                outbox,
                sessions,
                policy,
                state,
                directory,
                lookup,
                config,
            }),
        }
    }

    /// Send `text` from `sender` to the entity named `target_name`.
    ///
    /// Every refusal is also reported to the sender through the session
    /// provider using the configured feedback templates.
    pub async fn send(&self, sender: &LocalEntity, target_name: &str, text: &str) -> SendOutcome {
        let inner = &self.inner;
        let cfg = &inner.config;

        if NameKey::new(sender.name.as_str()) == NameKey::new(target_name) {
            self.feedback(sender.id, &cfg.self_message, target_name);
            return SendOutcome::Rejected(RejectReason::SelfTarget);
        }

        if let Some(target) = inner.sessions.find_by_name(target_name) {
            return self.deliver_local(sender, &target, text);
        }

        if !cfg.enabled || !inner.outbox.is_connected() {
            self.feedback(sender.id, &cfg.unavailable, target_name);
            return SendOutcome::Unavailable;
        }

        let text = match inner.policy.review(sender.id, text) {
            PolicyVerdict::Allow(text) => text,
            PolicyVerdict::Reject => {
                self.feedback(sender.id, &cfg.blocked, target_name);
                return SendOutcome::Rejected(RejectReason::ContentBlocked);
            }
        };

        let Some(resolved) = self.resolve(target_name).await else {
            debug!(sender = %sender.name, target = %target_name, "directed message target not found");
            self.feedback(sender.id, &cfg.player_not_found, target_name);
            return SendOutcome::NotFound;
        };

        // Connected here while the lookup was in flight.
        if &resolved.node == inner.outbox.node_id() {
            return match inner.sessions.find_by_name(resolved.name.as_str()) {
                Some(target) => self.deliver_local(sender, &target, text.as_str()),
                None => {
                    self.feedback(sender.id, &cfg.player_not_found, target_name);
                    SendOutcome::NotFound
                }
            };
        }

        let published = inner
            .outbox
            .send_to(
                &cfg.message_channel,
                &resolved.node,
                Payload::DirectedMessage {
                    sender_id: sender.id,
                    sender_name: sender.name.clone(),
                    recipient_name: resolved.name.clone(),
                    message: text.clone(),
                },
            )
            .await;
        if !published {
            warn!(sender = %sender.name, target = %resolved.name, node = %resolved.node, "directed message publish failed");
            self.feedback(sender.id, &cfg.unavailable, resolved.name.as_str());
            return SendOutcome::Unavailable;
        }

        inner.sessions.deliver(
            sender.id,
            &render(
                &cfg.cross_sender_format,
                &[
                    ("receiver", resolved.name.as_str()),
                    ("node", resolved.node.as_str()),
                    ("message", text.as_str()),
                ],
            ),
        );
        info!(sender = %sender.name, target = %resolved.name, node = %resolved.node, "directed message dispatched");
        SendOutcome::Dispatched {
            node: resolved.node,
        }
    }

    /// Send `text` to `sender`'s reply link.
    pub async fn reply(&self, sender: &LocalEntity, text: &str) -> SendOutcome {
        let inner = &self.inner;
        let Some(link) = inner.state.reply_link(sender.id) else {
            self.feedback(sender.id, &inner.config.no_reply_target, "");
            return SendOutcome::Rejected(RejectReason::NoReplyTarget);
        };
        let name = inner
            .sessions
            .find_by_id(link.entity_id)
            .map(|e| e.name)
            .or_else(|| inner.directory.find_by_id(link.entity_id).map(|e| e.name))
            .unwrap_or(link.name);
        self.send(sender, &name, text).await
    }

    /// Owner side: an inbound directed message for a local entity.
    pub fn handle_directed(
        &self,
        origin: &NodeId,
        sender_id: EntityId,
        sender_name: &str,
        recipient_name: &str,
        message: &str,
    ) {
        let inner = &self.inner;
        let cfg = &inner.config;

        let Some(recipient) = inner.sessions.find_by_name(recipient_name) else {
            warn!(%origin, sender = %sender_name, recipient = %recipient_name, "directed message delivery failed, recipient not on this node");
            return;
        };
        if recipient.id == sender_id {
            debug!(%origin, recipient = %recipient.name, "dropping directed message to self");
            return;
        }
        if !inner.state.accepts_messages(recipient.id) {
            debug!(%origin, sender = %sender_name, recipient = %recipient.name, "recipient has messages off");
            return;
        }
        if inner.state.is_ignoring(recipient.id, sender_id) {
            debug!(%origin, sender = %sender_name, recipient = %recipient.name, "recipient ignores sender");
            return;
        }
        let text = match inner.policy.review(sender_id, message) {
            PolicyVerdict::Allow(text) => text,
            PolicyVerdict::Reject => {
                debug!(%origin, sender = %sender_name, "directed message blocked by policy");
                return;
            }
        };

        let line = render(
            &cfg.cross_receiver_format,
            &[("sender", sender_name), ("node", origin.as_str()), ("message", text.as_str())],
        );
        if !inner.sessions.deliver(recipient.id, &line) {
            warn!(%origin, recipient = %recipient.name, "directed message delivery failed, recipient left");
            return;
        }

        inner.directory.upsert(sender_name, sender_id, origin);
        inner
            .state
            .set_reply_link(recipient.id, sender_id, sender_name);
        drop(inner.outbox.send_to(
            &cfg.reply_channel,
            origin,
            Payload::ReplyLinkUpdate {
                entity_id: sender_id,
                reply_to: recipient.id,
                reply_to_name: recipient.name.clone(),
            },
        ));

        self.fan_out_spies(
            sender_id,
            recipient.id,
            &render(
                &cfg.cross_social_spy_format,
                &[
                    ("sender", sender_name),
                    ("sender_node", origin.as_str()),
                    ("receiver", recipient.name.as_str()),
                    ("receiver_node", inner.outbox.node_id().as_str()),
                    ("message", text.as_str()),
                ],
            ),
        );
        drop(inner.outbox.broadcast(
            &cfg.social_spy_channel,
            Payload::SocialSpy {
                sender_id,
                sender_name: sender_name.to_string(),
                sender_node: origin.clone(),
                recipient_id: recipient.id,
                recipient_name: recipient.name.clone(),
                message: text.clone(),
            },
        ));
        info!(%origin, sender = %sender_name, recipient = %recipient.name, "directed message delivered");
    }

    /// Show another node's delivered message to local spies.
    ///
    /// `origin` is the node that delivered it.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_social_spy(
        &self,
        origin: &NodeId,
        sender_id: EntityId,
        sender_name: &str,
        sender_node: &NodeId,
        recipient_id: EntityId,
        recipient_name: &str,
        message: &str,
    ) {
        let line = render(
            &self.inner.config.cross_social_spy_format,
            &[
                ("sender", sender_name),
                ("sender_node", sender_node.as_str()),
                ("receiver", recipient_name),
                ("receiver_node", origin.as_str()),
                ("message", message),
            ],
        );
        self.fan_out_spies(sender_id, recipient_id, &line);
    }

    /// Point a local entity's reply link at whoever it just messaged.
    pub fn handle_reply_link_update(
        &self,
        origin: &NodeId,
        entity_id: EntityId,
        reply_to: EntityId,
        reply_to_name: &str,
    ) {
        let inner = &self.inner;
        if inner.sessions.find_by_id(entity_id).is_none() {
            debug!(%origin, %entity_id, "reply link update for entity no longer here");
            return;
        }
        inner.state.set_reply_link(entity_id, reply_to, reply_to_name);
        inner.directory.upsert(reply_to_name, reply_to, origin);
    }

    fn deliver_local(&self, sender: &LocalEntity, target: &LocalEntity, text: &str) -> SendOutcome {
        let inner = &self.inner;
        let cfg = &inner.config;

        if target.id == sender.id {
            self.feedback(sender.id, &cfg.self_message, target.name.as_str());
            return SendOutcome::Rejected(RejectReason::SelfTarget);
        }
        if !inner.state.accepts_messages(target.id)
            && !inner
                .sessions
                .has_capability(sender.id, &cfg.bypass_toggle_capability)
        {
            self.feedback(sender.id, &cfg.messages_disabled, target.name.as_str());
            return SendOutcome::Rejected(RejectReason::MessagesDisabled);
        }
        if inner.state.is_ignoring(target.id, sender.id) {
            self.feedback(sender.id, &cfg.ignored, target.name.as_str());
            return SendOutcome::Rejected(RejectReason::Ignored);
        }
        let text = match inner.policy.review(sender.id, text) {
            PolicyVerdict::Allow(text) => text,
            PolicyVerdict::Reject => {
                self.feedback(sender.id, &cfg.blocked, target.name.as_str());
                return SendOutcome::Rejected(RejectReason::ContentBlocked);
            }
        };

        inner.state.set_reply_link(sender.id, target.id, target.name.as_str());
        inner.state.set_reply_link(target.id, sender.id, sender.name.as_str());

        inner.sessions.deliver(
            sender.id,
            &render(&cfg.sender_format, &[("receiver", target.name.as_str()), ("message", text.as_str())]),
        );
        inner.sessions.deliver(
            target.id,
            &render(&cfg.receiver_format, &[("sender", sender.name.as_str()), ("message", text.as_str())]),
        );
        self.fan_out_spies(
            sender.id,
            target.id,
            &render(
                &cfg.social_spy_format,
                &[("sender", sender.name.as_str()), ("receiver", target.name.as_str()), ("message", text.as_str())],
            ),
        );
        debug!(sender = %sender.name, target = %target.name, "directed message delivered locally");
        SendOutcome::DeliveredLocally
    }

    async fn resolve(&self, name: &str) -> Option<Resolved> {
        if let Some(entry) = self.inner.directory.get(name) {
            return Some(Resolved {
                node: entry.node,
                name: entry.name,
            });
        }
        match self.inner.lookup.lookup(name).await {
            LookupResult::Found { node, name, .. } => Some(Resolved { node, name }),
            LookupResult::NotFound => None,
        }
    }

    /// Copies go only to spies that still hold the social-spy capability.
    fn fan_out_spies(&self, sender: EntityId, recipient: EntityId, line: &str) {
        let inner = &self.inner;
        for spy in inner.state.social_spies() {
            if spy == sender || spy == recipient {
                continue;
            }
            if inner
                .sessions
                .has_capability(spy, &inner.config.social_spy_capability)
            {
                inner.sessions.deliver(spy, line);
            }
        }
    }

    fn feedback(&self, to: EntityId, template: &str, name: &str) {
        self.inner.sessions.deliver(to, &render(template, &[("name", name)]));
    }
}
