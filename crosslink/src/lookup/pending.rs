//! Pending lookup bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! Request Flow:
//!   1. Create PendingRequest with oneshot::Sender
//!   2. Insert into PendingLookups under a fresh CorrelationId
//!   3. Spawn timeout task
//!   4. Publish lookup_request
//!   5. Caller awaits LookupFuture (oneshot::Receiver)
//!
//! Completion (exactly one of):
//!   - positive lookup_response  → complete(id, Found)
//!   - timeout task fires        → complete(id, NotFound)
//!   - publish fails             → complete(id, NotFound)
//!   - node shuts down           → drain(NotFound)
//! ```
//!
//! `complete` removes the entry from the map before sending. The map
//! removal is atomic, so whichever path removes first wins and every later
//! path finds nothing and does nothing.

use std::sync::Arc;
use std::time::Duration;

use crosslink_core::CorrelationId;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use super::LookupResult;

/// One lookup awaiting its outcome.
pub(crate) struct PendingRequest {
    name: String,
    created_at: Instant,
    timeout: Duration,
    sender: oneshot::Sender<LookupResult>,
}

impl PendingRequest {
    pub(crate) fn new(
        name: impl Into<String>,
        timeout: Duration,
        sender: oneshot::Sender<LookupResult>,
    ) -> Self {
        Self {
            name: name.into(),
            created_at: Instant::now(),
            timeout,
            sender,
        }
    }

    /// Time since the request was registered.
    pub(crate) fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Deliver the outcome. The waiting caller may have given up already.
    fn resolve(self, result: LookupResult) {
        let elapsed = self.elapsed();
        if self.sender.send(result).is_err() {
            debug!(name = %self.name, ?elapsed, "lookup caller went away before completion");
        }
    }
}

/// Table of in-flight lookups. Clones share the table.
#[derive(Clone, Default)]
pub(crate) struct PendingLookups {
    requests: Arc<DashMap<CorrelationId, PendingRequest>>,
}

impl PendingLookups {
    pub(crate) fn insert(&self, id: CorrelationId, request: PendingRequest) {
        self.requests.insert(id, request);
    }

    /// Resolve `id` if still pending. Returns `false` when another path
    /// already resolved it.
    pub(crate) fn complete(&self, id: CorrelationId, result: LookupResult) -> bool {
        match self.requests.remove(&id) {
            Some((_, request)) => {
                debug!(
                    correlation_id = %id,
                    name = %request.name,
                    elapsed = ?request.elapsed(),
                    timeout = ?request.timeout,
                    found = result.is_found(),
                    "lookup resolved"
                );
                request.resolve(result);
                true
            }
            None => false,
        }
    }

    /// Resolve every pending lookup with `NotFound`; returns how many.
    pub(crate) fn drain(&self) -> usize {
        let ids: Vec<CorrelationId> = self.requests.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter(|id| self.complete(*id, LookupResult::NotFound))
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_core::{EntityId, NodeId};

    fn found() -> LookupResult {
        LookupResult::Found {
            node: NodeId::new("b"),
            entity_id: EntityId::random(),
            name: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_completion_wins() {
        let pending = PendingLookups::default();
        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        pending.insert(id, PendingRequest::new("alice", Duration::from_secs(5), tx));

        let winner = found();
        assert!(pending.complete(id, winner.clone()));
        assert!(!pending.complete(id, LookupResult::NotFound));
        assert!(!pending.complete(id, found()));

        assert_eq!(rx.await.expect("resolved"), winner);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_completion_after_caller_dropped_is_harmless() {
        let pending = PendingLookups::default();
        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        pending.insert(id, PendingRequest::new("bob", Duration::from_secs(5), tx));
        drop(rx);

        assert!(pending.complete(id, LookupResult::NotFound));
    }

    #[tokio::test]
    async fn test_drain_resolves_everything_not_found() {
        let pending = PendingLookups::default();
        let mut receivers = Vec::new();
        for name in ["a", "b", "c"] {
            let (tx, rx) = oneshot::channel();
            pending.insert(
                CorrelationId::generate(),
                PendingRequest::new(name, Duration::from_secs(5), tx),
            );
            receivers.push(rx);
        }

        assert_eq!(pending.drain(), 3);
        for rx in receivers {
            assert_eq!(rx.await.expect("resolved"), LookupResult::NotFound);
        }
        assert_eq!(pending.drain(), 0);
    }
}
