//! Configuration structures for the broker connection and the pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Where the broker lives and how to authenticate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,

    /// Broker TCP port.
    pub port: u16,

    /// ACL user name; only sent together with `password`.
    pub username: Option<String>,

    /// Password sent with `AUTH` after connecting. `None` skips `AUTH`.
    pub password: Option<String>,

    /// Logical database selected after connecting. Pub/sub ignores the
    /// database number but `SELECT` still validates it.
    pub database: u32,

    /// Timeout for establishing the TCP connection, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Timeout for a single command round trip, in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            connect_timeout_ms: 2000,
            response_timeout_ms: 2000,
        }
    }
}

impl BrokerConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Response timeout as a `Duration`.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Set the broker address.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the `AUTH` password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Connection pool sizing.
///
/// `max_total` bounds live connections, both idle and checked out.
/// Every subscription pins one connection for its whole lifetime, so
/// `max_total` must leave room for publishes next to the subscriptions a
/// node opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on live connections.
    pub max_total: usize,

    /// Upper bound on idle connections kept for reuse.
    pub max_idle: usize,

    /// Idle connections opened eagerly by `initialize`.
    pub min_idle: usize,

    /// How long a checkout waits for a free slot, in milliseconds.
    pub checkout_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            checkout_timeout_ms: 2000,
        }
    }
}

impl PoolConfig {
    /// Checkout timeout as a `Duration`.
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    /// Set `max_total`, clamping `max_idle` and `min_idle` below it.
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self.max_idle = self.max_idle.min(max_total);
        self.min_idle = self.min_idle.min(self.max_idle);
        self
    }

    /// Set `min_idle`.
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Check `min_idle <= max_idle <= max_total` and `max_total >= 1`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidConfig` describing the first violated
    /// bound.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_total == 0 {
            return Err(TransportError::InvalidConfig {
                message: "pool.max_total must be at least 1".to_string(),
            });
        }
        if self.max_idle > self.max_total {
            return Err(TransportError::InvalidConfig {
                message: format!(
                    "pool.max_idle ({}) exceeds pool.max_total ({})",
                    self.max_idle, self.max_total
                ),
            });
        }
        if self.min_idle > self.max_idle {
            return Err(TransportError::InvalidConfig {
                message: format!(
                    "pool.min_idle ({}) exceeds pool.max_idle ({})",
                    self.min_idle, self.max_idle
                ),
            });
        }
        Ok(())
    }
}
