//! Node-local messaging registries: reply links, social spy, message
//! toggle, staff chat mode and ignore lists.
//!
//! None of this is synchronized across nodes. An entity that reconnects to
//! another node starts with fresh toggles and ignores there, and reply
//! links on the two ends of a conversation are updated independently.

use std::collections::HashSet;
use std::sync::Arc;

use crosslink_core::EntityId;
use dashmap::{DashMap, DashSet};

/// Last interlocutor of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLink {
    /// Interlocutor id.
    pub entity_id: EntityId,
    /// Interlocutor name when the link was set.
    pub name: String,
}

#[derive(Default)]
struct Registries {
    reply_links: DashMap<EntityId, ReplyLink>,
    social_spy: DashSet<EntityId>,
    messages_off: DashSet<EntityId>,
    staff_chat_mode: DashSet<EntityId>,
    ignores: DashMap<EntityId, HashSet<EntityId>>,
}

/// Shared handle to the registries. Clones share state.
#[derive(Clone, Default)]
pub struct MessagingState {
    inner: Arc<Registries>,
}

impl MessagingState {
    /// Empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `owner`'s reply link at `target`.
    pub fn set_reply_link(&self, owner: EntityId, target: EntityId, target_name: &str) {
        self.inner.reply_links.insert(
            owner,
            ReplyLink {
                entity_id: target,
                name: target_name.to_string(),
            },
        );
    }

    /// `owner`'s current reply link.
    pub fn reply_link(&self, owner: EntityId) -> Option<ReplyLink> {
        self.inner.reply_links.get(&owner).map(|l| l.value().clone())
    }

    /// Flip social spy for `id`; returns the new state.
    pub fn toggle_social_spy(&self, id: EntityId) -> bool {
        if self.inner.social_spy.remove(&id).is_some() {
            false
        } else {
            self.inner.social_spy.insert(id);
            true
        }
    }

    /// Whether `id` has social spy on.
    pub fn is_social_spy(&self, id: EntityId) -> bool {
        self.inner.social_spy.contains(&id)
    }

    /// Every entity with social spy on.
    pub fn social_spies(&self) -> Vec<EntityId> {
        self.inner.social_spy.iter().map(|id| *id).collect()
    }

    /// Flip message acceptance for `id`; returns `true` when `id` accepts
    /// messages afterwards.
    pub fn toggle_messages(&self, id: EntityId) -> bool {
        if self.inner.messages_off.remove(&id).is_some() {
            true
        } else {
            self.inner.messages_off.insert(id);
            false
        }
    }

    /// Whether `id` accepts directed messages.
    pub fn accepts_messages(&self, id: EntityId) -> bool {
        !self.inner.messages_off.contains(&id)
    }

    /// Flip staff chat mode for `id`: while on, its ordinary chat goes to
    /// staff chat. Returns the new state.
    pub fn toggle_staff_chat(&self, id: EntityId) -> bool {
        if self.inner.staff_chat_mode.remove(&id).is_some() {
            false
        } else {
            self.inner.staff_chat_mode.insert(id);
            true
        }
    }

    /// Whether `id` has staff chat mode on.
    pub fn in_staff_chat_mode(&self, id: EntityId) -> bool {
        self.inner.staff_chat_mode.contains(&id)
    }

    /// `owner` ignores `target`; returns `false` if it already did.
    pub fn ignore(&self, owner: EntityId, target: EntityId) -> bool {
        self.inner.ignores.entry(owner).or_default().insert(target)
    }

    /// `owner` stops ignoring `target`; returns `false` if it did not.
    pub fn unignore(&self, owner: EntityId, target: EntityId) -> bool {
        let removed = match self.inner.ignores.get_mut(&owner) {
            Some(mut set) => set.remove(&target),
            None => false,
        };
        self.inner.ignores.remove_if(&owner, |_, set| set.is_empty());
        removed
    }

    /// Whether `owner` ignores `target`.
    pub fn is_ignoring(&self, owner: EntityId, target: EntityId) -> bool {
        self.inner
            .ignores
            .get(&owner)
            .is_some_and(|set| set.contains(&target))
    }

    /// Everyone `owner` ignores.
    pub fn ignored_by(&self, owner: EntityId) -> Vec<EntityId> {
        self.inner
            .ignores
            .get(&owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget session-scoped state of an entity that left this node.
    ///
    /// Drops its social spy, toggle and staff chat flags, its own reply link
    /// and every reply link pointing at it. Ignore lists survive reconnects.
    pub fn handle_disconnect(&self, id: EntityId) {
        self.inner.social_spy.remove(&id);
        self.inner.messages_off.remove(&id);
        self.inner.staff_chat_mode.remove(&id);
        self.inner.reply_links.remove(&id);
        self.inner.reply_links.retain(|_, link| link.entity_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_flip() {
        let state = MessagingState::new();
        let id = EntityId::random();

        assert!(state.accepts_messages(id));
        assert!(!state.toggle_messages(id));
        assert!(!state.accepts_messages(id));
        assert!(state.toggle_messages(id));
        assert!(state.accepts_messages(id));

        assert!(state.toggle_social_spy(id));
        assert_eq!(state.social_spies(), vec![id]);
        assert!(!state.toggle_social_spy(id));
        assert!(!state.is_social_spy(id));

        assert!(state.toggle_staff_chat(id));
        assert!(state.in_staff_chat_mode(id));
        assert!(!state.toggle_staff_chat(id));
        assert!(!state.in_staff_chat_mode(id));
    }

    #[test]
    fn test_ignore_list() {
        let state = MessagingState::new();
        let (a, b) = (EntityId::random(), EntityId::random());

        assert!(state.ignore(a, b));
        assert!(!state.ignore(a, b));
        assert!(state.is_ignoring(a, b));
        assert!(!state.is_ignoring(b, a));
        assert_eq!(state.ignored_by(a), vec![b]);

        assert!(state.unignore(a, b));
        assert!(!state.unignore(a, b));
        assert!(state.ignored_by(a).is_empty());
    }

    #[test]
    fn test_disconnect_clears_links_both_ways() {
        let state = MessagingState::new();
        let (a, b, c) = (EntityId::random(), EntityId::random(), EntityId::random());
        state.set_reply_link(a, b, "b");
        state.set_reply_link(b, a, "a");
        state.set_reply_link(c, b, "b");
        state.toggle_social_spy(a);
        state.toggle_messages(a);
        state.toggle_staff_chat(a);
        state.ignore(a, c);

        state.handle_disconnect(a);

        assert!(state.reply_link(a).is_none());
        assert!(state.reply_link(b).is_none());
        assert_eq!(state.reply_link(c).map(|l| l.entity_id), Some(b));
        assert!(!state.is_social_spy(a));
        assert!(state.accepts_messages(a));
        assert!(!state.in_staff_chat_mode(a));
        assert!(state.is_ignoring(a, c));
    }
}
