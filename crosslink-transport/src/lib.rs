//! # crosslink-transport
//!
//! Connection-pooled publish/subscribe transport.
//!
//! This crate provides:
//! - **Broker abstraction**: [`Broker`], [`BrokerConnection`],
//!   [`BrokerSubscription`] with a Redis implementation and an in-process one
//! - **Wire format**: RESP encode and incremental decode
//! - **Pool**: bounded connection reuse with checkout timeouts
//! - **Transport**: fire-and-forget publish and long-lived subscription
//!   workers behind [`PubSubTransport`]
//!
//! The transport has no notion of envelopes or nodes; it moves opaque
//! payloads between channels.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Broker trait and implementations.
pub mod broker;

/// Connection and pool settings.
pub mod config;

/// Error types for transport operations.
pub mod error;

/// Transport counters.
pub mod metrics;

/// Bounded connection pool.
pub mod pool;

/// RESP wire format.
pub mod resp;

/// Publish/subscribe facade.
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use broker::{
    Broker, BrokerConnection, BrokerSubscription, ChannelMessage, MemoryBroker, RedisBroker,
};
pub use config::{BrokerConfig, PoolConfig};
pub use error::{TransportError, TransportResult};
pub use metrics::{MetricsSnapshot, TransportMetrics};
pub use pool::{ConnectionPool, PooledConnection};
pub use resp::{RespError, RespValue};
pub use transport::{MessageHandler, PubSubTransport, PublishHandle, SubscriptionHandle};
