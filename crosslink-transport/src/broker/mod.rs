//! Broker abstraction.
//!
//! A [`Broker`] hands out [`BrokerConnection`]s. A connection can publish
//! and ping, or be turned into a [`BrokerSubscription`] that yields
//! [`ChannelMessage`]s until it is dropped or the broker goes away.
//!
//! ```text
//!   Broker ──connect()──► BrokerConnection ──subscribe(self)──► BrokerSubscription
//!                             │  ping()                             │ next_message()
//!                             │  publish()                          ▼
//!                             ▼                                 ChannelMessage
//!                         ConnectionPool
//! ```
//!
//! Two implementations ship with the crate:
//!
//! - [`RedisBroker`]: RESP over TCP to a Redis-compatible server
//! - [`MemoryBroker`]: in-process hub for tests and single-process setups

mod memory;
mod redis;

pub use memory::{MemoryBroker, MemoryConnection, MemorySubscription};
pub use redis::{RedisBroker, RedisConnection, RedisSubscription};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportResult;

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Raw payload.
    pub payload: Bytes,
}

/// Factory for broker connections.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Connection type produced by this broker.
    type Connection: BrokerConnection;

    /// Open and authenticate a new connection.
    async fn connect(&self) -> TransportResult<Self::Connection>;
}

/// A single command connection.
#[async_trait]
pub trait BrokerConnection: Send + 'static {
    /// Subscription type this connection turns into.
    type Subscription: BrokerSubscription;

    /// Round-trip liveness probe.
    async fn ping(&mut self) -> TransportResult<()>;

    /// Publish `payload` on `channel`; returns how many subscribers the
    /// broker delivered it to.
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> TransportResult<u64>;

    /// Switch this connection into subscriber mode.
    async fn subscribe(self, channels: &[String]) -> TransportResult<Self::Subscription>;

    /// `false` once an I/O or protocol error has been observed.
    ///
    /// Unhealthy connections are discarded instead of being re-pooled.
    fn is_healthy(&self) -> bool;
}

/// A connection in subscriber mode.
#[async_trait]
pub trait BrokerSubscription: Send + 'static {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` when the broker closed the connection. Must be
    /// cancel-safe: dropping the future loses no buffered message.
    async fn next_message(&mut self) -> TransportResult<Option<ChannelMessage>>;
}
