//! Transport counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one [`PubSubTransport`](crate::PubSubTransport).
#[derive(Debug, Default)]
pub struct TransportMetrics {
    published: AtomicU64,
    publish_failed: AtomicU64,
    received: AtomicU64,
    handler_panics: AtomicU64,
}

/// Point-in-time copy of [`TransportMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Publishes acknowledged by the broker.
    pub published: u64,
    /// Publishes that were rejected or failed.
    pub publish_failed: u64,
    /// Messages handed to subscription handlers.
    pub received: u64,
    /// Handler invocations that panicked.
    pub handler_panics: u64,
}

impl TransportMetrics {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_failed(&self) {
        self.publish_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failed: self.publish_failed.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }
}
