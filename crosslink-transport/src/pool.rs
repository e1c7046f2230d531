//! Bounded connection pool.
//!
//! A semaphore with `max_total` permits bounds how many connections are
//! checked out at once. Idle connections sit in a queue and are reused
//! before a new one is opened, so the number of live connections never
//! exceeds `max_total` either.
//!
//! ```text
//!  checkout() ── acquire permit (≤ checkout_timeout) ──► pop healthy idle
//!                                                        └─ else connect()
//!  drop(PooledConnection) ── healthy && idle < max_idle ──► push idle
//!                         └─ otherwise ──────────────────► close
//!  detach() ── connection + permit leave the pool (subscriptions)
//! ```

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::broker::{Broker, BrokerConnection};
use crate::config::PoolConfig;
use crate::error::{TransportError, TransportResult};

/// Pool of broker connections.
pub struct ConnectionPool<B: Broker> {
    broker: Arc<B>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<B::Connection>>,
    closed: AtomicBool,
}

impl<B: Broker> ConnectionPool<B> {
    /// Create an empty pool. No connection is opened until the first
    /// checkout or [`prewarm`](Self::prewarm).
    pub fn new(broker: Arc<B>, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            broker,
            permits: Arc::new(Semaphore::new(config.max_total)),
            idle: Mutex::new(VecDeque::with_capacity(config.max_idle)),
            config,
            closed: AtomicBool::new(false),
        })
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<B::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow a connection.
    ///
    /// # Errors
    ///
    /// - `PoolExhausted` when no slot frees up within `checkout_timeout`
    /// - `PoolClosed` after [`close`](Self::close)
    /// - any connect error when a fresh connection has to be opened
    pub async fn checkout(self: &Arc<Self>) -> TransportResult<PooledConnection<B>> {
        if self.is_closed() {
            return Err(TransportError::PoolClosed);
        }

        let waited = self.config.checkout_timeout();
        let permit = tokio::time::timeout(waited, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| TransportError::PoolExhausted { waited })?
            .map_err(|_| TransportError::PoolClosed)?;

        let conn = match self.pop_healthy_idle() {
            Some(conn) => conn,
            None => self.broker.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::clone(self),
        })
    }

    fn pop_healthy_idle(&self) -> Option<B::Connection> {
        let mut idle = self.idle();
        while let Some(conn) = idle.pop_front() {
            if conn.is_healthy() {
                return Some(conn);
            }
            debug!("discarding unhealthy idle connection");
        }
        None
    }

    /// Open connections until `min_idle` are idle.
    ///
    /// Stops at the first connect failure and returns how many were opened.
    pub async fn prewarm(self: &Arc<Self>) -> usize {
        let mut opened = 0;
        while !self.is_closed() && self.idle_count() < self.config.min_idle {
            match self.broker.connect().await {
                Ok(conn) => {
                    self.idle().push_back(conn);
                    opened += 1;
                }
                Err(e) => {
                    warn!(error = %e, opened, "pool prewarm stopped early");
                    break;
                }
            }
        }
        opened
    }

    /// Close the pool: drop idle connections and fail pending checkouts.
    ///
    /// Checked-out connections are dropped instead of returned.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        self.idle().clear();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections currently idle.
    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    /// Connections currently checked out or detached.
    pub fn in_use(&self) -> usize {
        self.config.max_total - self.permits.available_permits()
    }

    fn give_back(&self, conn: B::Connection) {
        if self.is_closed() || !conn.is_healthy() {
            return;
        }
        let mut idle = self.idle();
        if idle.len() < self.config.max_idle {
            idle.push_back(conn);
        }
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Returned to the pool on drop when still healthy.
pub struct PooledConnection<B: Broker> {
    conn: Option<B::Connection>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<ConnectionPool<B>>,
}

impl<B: Broker> PooledConnection<B> {
    /// Take the connection out of the pool for good.
    ///
    /// The returned permit keeps the slot reserved until it is dropped;
    /// subscriptions hold it for their whole lifetime.
    pub fn detach(mut self) -> Option<(B::Connection, OwnedSemaphorePermit)> {
        let conn = self.conn.take()?;
        let permit = self.permit.take()?;
        Some((conn, permit))
    }
}

impl<B: Broker> Deref for PooledConnection<B> {
    type Target = B::Connection;

    fn deref(&self) -> &B::Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection only taken by detach, which consumes the guard"),
        }
    }
}

impl<B: Broker> DerefMut for PooledConnection<B> {
    fn deref_mut(&mut self) -> &mut B::Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection only taken by detach, which consumes the guard"),
        }
    }
}

impl<B: Broker> Drop for PooledConnection<B> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
        // Permit drops after the connection is back in the idle queue.
        self.permit.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::time::Duration;

    fn pool(broker: &MemoryBroker, config: PoolConfig) -> Arc<ConnectionPool<MemoryBroker>> {
        ConnectionPool::new(Arc::new(broker.clone()), config)
    }

    #[tokio::test]
    async fn test_connections_are_reused() {
        let broker = MemoryBroker::new();
        let pool = pool(&broker, PoolConfig::default());

        for _ in 0..5 {
            let mut conn = pool.checkout().await.expect("checkout");
            conn.ping().await.expect("ping");
        }

        assert_eq!(broker.connect_count(), 1);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_times_out_when_exhausted() {
        let broker = MemoryBroker::new();
        let config = PoolConfig {
            max_total: 1,
            max_idle: 1,
            min_idle: 0,
            checkout_timeout_ms: 100,
        };
        let pool = pool(&broker, config);

        let _held = pool.checkout().await.expect("checkout");
        let err = pool.checkout().await.err().expect("exhausted");
        assert!(matches!(err, TransportError::PoolExhausted { waited } if waited == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_unhealthy_connection_is_not_repooled() {
        let broker = MemoryBroker::new();
        let pool = pool(&broker, PoolConfig::default());

        {
            let _conn = pool.checkout().await.expect("checkout");
            broker.disconnect_all();
        }
        assert_eq!(pool.idle_count(), 0);

        let mut conn = pool.checkout().await.expect("checkout");
        conn.ping().await.expect("fresh connection works");
        assert_eq!(broker.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_detach_keeps_slot_reserved() {
        let broker = MemoryBroker::new();
        let config = PoolConfig::default().with_max_total(2);
        let pool = pool(&broker, config);

        let (_conn, permit) = pool
            .checkout()
            .await
            .expect("checkout")
            .detach()
            .expect("detach");
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.idle_count(), 0);

        drop(permit);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn test_prewarm_and_close() {
        let broker = MemoryBroker::new();
        let pool = pool(&broker, PoolConfig::default().with_min_idle(3));

        assert_eq!(pool.prewarm().await, 3);
        assert_eq!(pool.idle_count(), 3);

        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(
            pool.checkout().await.err(),
            Some(TransportError::PoolClosed)
        ));
    }
}
