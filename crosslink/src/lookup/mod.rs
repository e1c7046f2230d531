//! Correlated lookup: find which node holds an entity.
//!
//! A lookup broadcasts `lookup_request { name }` with a fresh correlation
//! id and waits. Every node holding the name answers with a positive
//! `lookup_response` addressed to the requester; nodes that do not hold it
//! answer negatively. The first positive response wins. Negative responses
//! never resolve a lookup, so "not found" is only reported once the
//! timeout expires.
//!
//! # Example
//!
//! ```rust,ignore
//! match node.lookup("alice").await {
//!     LookupResult::Found { node, .. } => println!("alice is on {node}"),
//!     LookupResult::NotFound => println!("alice is offline"),
//! }
//! ```

mod future;
mod pending;

pub use future::LookupFuture;

use std::sync::Arc;
use std::time::Duration;

use crosslink_core::{CorrelationId, EntityId, NodeId};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::config::PrivateMessagesConfig;
use crate::directory::DirectoryCache;
use crate::protocol::{Outbox, Payload};
use crate::session::SessionProvider;
use pending::{PendingLookups, PendingRequest};

/// Terminal outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// The entity is connected to `node`.
    Found {
        /// Owning node.
        node: NodeId,
        /// Entity id.
        entity_id: EntityId,
        /// Display name as reported by the owner.
        name: String,
    },
    /// No node reported the entity before the timeout.
    NotFound,
}

impl LookupResult {
    /// Whether the entity was found.
    pub fn is_found(&self) -> bool {
        matches!(self, LookupResult::Found { .. })
    }

    /// Owning node, if found.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            LookupResult::Found { node, .. } => Some(node),
            LookupResult::NotFound => None,
        }
    }
}

struct Inner {
    outbox: Outbox,
    sessions: Arc<dyn SessionProvider>,
    directory: DirectoryCache,
    pending: PendingLookups,
    request_channel: String,
    response_channel: String,
    timeout: Duration,
    enabled: bool,
}

/// Issues lookups and answers other nodes' lookups.
#[derive(Clone)]
pub struct LookupService {
    inner: Arc<Inner>,
}

impl LookupService {
    /// Create the service.
    pub fn new(
        outbox: Outbox,
        sessions: Arc<dyn SessionProvider>,
        directory: DirectoryCache,
        config: &PrivateMessagesConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                outbox,
                sessions,
                directory,
                pending: PendingLookups::default(),
                request_channel: config.lookup_channel.clone(),
                response_channel: config.lookup_response_channel.clone(),
                timeout: config.lookup_timeout(),
                enabled: config.enabled,
            }),
        }
    }

    /// Find the node holding `name`.
    ///
    /// Entities connected to this node resolve immediately. Otherwise the
    /// future resolves on the first positive response, or to `NotFound`
    /// when the timeout expires or the request cannot be published. With
    /// messaging disabled or the transport down only local entities are
    /// found.
    pub fn lookup(&self, name: &str) -> LookupFuture {
        let inner = &self.inner;

        if let Some(local) = inner.sessions.find_by_name(name) {
            return LookupFuture::ready(LookupResult::Found {
                node: inner.outbox.node_id().clone(),
                entity_id: local.id,
                name: local.name,
            });
        }

        if !inner.enabled || !inner.outbox.is_connected() {
            debug!(%name, "lookup skipped, cross-node messaging unavailable");
            return LookupFuture::ready(LookupResult::NotFound);
        }

        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        inner
            .pending
            .insert(id, PendingRequest::new(name, inner.timeout, tx));

        let pending = inner.pending.clone();
        let timeout = inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.complete(id, LookupResult::NotFound) {
                debug!(correlation_id = %id, ?timeout, "lookup timed out");
            }
        });

        let publish = inner.outbox.send_correlated(
            &inner.request_channel,
            None,
            id,
            Payload::LookupRequest {
                name: name.to_string(),
            },
        );
        let pending = inner.pending.clone();
        tokio::spawn(async move {
            if !publish.await && pending.complete(id, LookupResult::NotFound) {
                warn!(correlation_id = %id, "lookup request could not be published");
            }
        });

        LookupFuture::waiting(rx)
    }

    /// Answer another node's lookup request.
    pub fn handle_request(
        &self,
        origin: &NodeId,
        correlation_id: Option<CorrelationId>,
        name: &str,
    ) {
        let Some(id) = correlation_id else {
            warn!(%origin, %name, "lookup request without correlation id");
            return;
        };
        let payload = match self.inner.sessions.find_by_name(name) {
            Some(entity) => Payload::LookupResponse {
                name: entity.name,
                found: true,
                entity_id: Some(entity.id),
            },
            None => Payload::LookupResponse {
                name: name.to_string(),
                found: false,
                entity_id: None,
            },
        };
        trace!(%origin, %name, "answering lookup");
        // Fire and forget; the requester times out if this is lost.
        drop(self.inner.outbox.send_correlated(
            &self.inner.response_channel,
            Some(origin),
            id,
            payload,
        ));
    }

    /// Handle a response to one of this node's lookups.
    pub fn handle_response(
        &self,
        origin: &NodeId,
        correlation_id: Option<CorrelationId>,
        name: &str,
        found: bool,
        entity_id: Option<EntityId>,
    ) {
        if !found {
            trace!(%origin, %name, "negative lookup response");
            return;
        }
        let Some(entity_id) = entity_id else {
            warn!(%origin, %name, "positive lookup response without entity id");
            return;
        };

        self.inner.directory.upsert(name, entity_id, origin);

        let resolved = correlation_id.is_some_and(|id| {
            self.inner.pending.complete(
                id,
                LookupResult::Found {
                    node: origin.clone(),
                    entity_id,
                    name: name.to_string(),
                },
            )
        });
        if !resolved {
            debug!(%origin, %name, "late or duplicate lookup response");
        }
    }

    /// Resolve every in-flight lookup with `NotFound`.
    pub fn shutdown(&self) -> usize {
        self.inner.pending.drain()
    }

    /// Lookups currently waiting.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::outbox;
    use crate::session::{InMemorySessions, LocalEntity};
    use std::sync::atomic::Ordering;

    fn service(node: &str) -> (
        LookupService,
        Arc<crate::protocol::testing::RecordingPublisher>,
        Arc<InMemorySessions>,
        DirectoryCache,
    ) {
        let (outbox, publisher) = outbox(node);
        let sessions = Arc::new(InMemorySessions::new());
        let directory = DirectoryCache::new(Duration::from_secs(300));
        let service = LookupService::new(
            outbox,
            sessions.clone(),
            directory.clone(),
            &PrivateMessagesConfig::default(),
        );
        (service, publisher, sessions, directory)
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_entity_resolves_without_publishing() {
        let (service, publisher, sessions, _) = service("a");
        let id = EntityId::random();
        sessions.connect(LocalEntity::new(id, "Alice", "hub"), &[]);

        let result = service.lookup("alice").await;
        assert_eq!(
            result,
            LookupResult::Found {
                node: NodeId::new("a"),
                entity_id: id,
                name: "Alice".to_string()
            }
        );
        assert!(publisher.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_positive_response_resolves_and_caches() {
        let (service, publisher, _, directory) = service("a");
        let future = service.lookup("bob");

        let sent = publisher.take();
        assert_eq!(sent.len(), 1);
        let (channel, request) = &sent[0];
        assert_eq!(channel, "crosslink:pm:lookup");
        let correlation = request.correlation_id;
        assert!(correlation.is_some());

        let bob = EntityId::random();
        service.handle_response(&NodeId::new("b"), correlation, "Bob", false, None);
        service.handle_response(&NodeId::new("c"), correlation, "Bob", true, Some(bob));
        service.handle_response(&NodeId::new("d"), correlation, "Bob", true, Some(bob));

        let result = future.await;
        assert_eq!(result.node(), Some(&NodeId::new("c")));
        assert_eq!(service.pending_count(), 0);
        // Duplicate responses still refresh the cache.
        assert_eq!(directory.get("bob").map(|e| e.node), Some(NodeId::new("d")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_to_not_found() {
        let (service, _publisher, _, _) = service("a");
        let started = tokio::time::Instant::now();

        let result = service.lookup("ghost").await;

        assert_eq!(result, LookupResult::NotFound);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_resolves_immediately() {
        let (service, publisher, _, _) = service("a");
        publisher.connected.store(false, Ordering::SeqCst);

        assert_eq!(service.lookup("bob").await, LookupResult::NotFound);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_answers_requests() {
        let (service, publisher, sessions, _) = service("a");
        let id = EntityId::random();
        sessions.connect(LocalEntity::new(id, "Carol", "hub"), &[]);
        let correlation = CorrelationId::generate();

        service.handle_request(&NodeId::new("b"), Some(correlation), "carol");
        service.handle_request(&NodeId::new("b"), Some(correlation), "nobody");
        service.handle_request(&NodeId::new("b"), None, "carol");

        let sent = publisher.take();
        assert_eq!(sent.len(), 2);
        let (channel, positive) = &sent[0];
        assert_eq!(channel, "crosslink:pm:lookup-response");
        assert_eq!(positive.target_node, Some(NodeId::new("b")));
        assert_eq!(positive.correlation_id, Some(correlation));
        assert_eq!(
            positive.payload,
            Payload::LookupResponse {
                name: "Carol".to_string(),
                found: true,
                entity_id: Some(id)
            }
        );
        assert!(matches!(
            sent[1].1.payload,
            Payload::LookupResponse { found: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_resolves_pending() {
        let (service, _publisher, _, _) = service("a");
        let first = service.lookup("x");
        let second = service.lookup("y");

        assert_eq!(service.shutdown(), 2);
        assert_eq!(first.await, LookupResult::NotFound);
        assert_eq!(second.await, LookupResult::NotFound);
    }
}
