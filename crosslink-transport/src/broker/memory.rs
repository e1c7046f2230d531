//! In-process broker.
//!
//! All [`MemoryBroker`] clones share one hub, so several nodes created in
//! the same process see each other's publishes exactly as they would
//! through a real server, including their own echoes. The hub can be taken
//! down with [`MemoryBroker::set_available`] and every open connection can
//! be severed with [`MemoryBroker::disconnect_all`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Broker, BrokerConnection, BrokerSubscription, ChannelMessage};
use crate::error::{TransportError, TransportResult};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

struct Hub {
    channels: Mutex<HashMap<String, Vec<Subscriber>>>,
    available: AtomicBool,
    generation: AtomicU64,
    next_subscriber: AtomicU64,
    connects: AtomicU64,
    published: AtomicU64,
}

impl Hub {
    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, generation: u64) -> bool {
        self.available.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn deliver(&self, channel: &str, payload: &[u8]) -> u64 {
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels();
        let Some(subscribers) = channels.get_mut(channel) else {
            return 0;
        };
        let message = ChannelMessage {
            channel: channel.to_string(),
            payload: Bytes::copy_from_slice(payload),
        };
        subscribers.retain(|s| s.tx.send(message.clone()).is_ok());
        subscribers.len() as u64
    }

    fn unregister(&self, id: u64) {
        let mut channels = self.channels();
        for subscribers in channels.values_mut() {
            subscribers.retain(|s| s.id != id);
        }
        channels.retain(|_, subscribers| !subscribers.is_empty());
    }
}

/// Shared in-process broker.
#[derive(Clone)]
pub struct MemoryBroker {
    hub: Arc<Hub>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an empty, available hub.
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                channels: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(1),
                connects: AtomicU64::new(0),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Take the hub up or down.
    ///
    /// Going down refuses new connections and severs every open one.
    pub fn set_available(&self, available: bool) {
        self.hub.available.store(available, Ordering::SeqCst);
        if !available {
            self.disconnect_all();
        }
    }

    /// Sever every open connection and subscription.
    ///
    /// Subscriptions observe end-of-stream; pooled connections report
    /// unhealthy on their next command.
    pub fn disconnect_all(&self) {
        self.hub.generation.fetch_add(1, Ordering::SeqCst);
        self.hub.channels().clear();
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.hub.channels().get(channel).map_or(0, Vec::len)
    }

    /// Total successful `connect` calls.
    pub fn connect_count(&self) -> u64 {
        self.hub.connects.load(Ordering::Relaxed)
    }

    /// Total publishes accepted by the hub.
    pub fn publish_count(&self) -> u64 {
        self.hub.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Connection = MemoryConnection;

    async fn connect(&self) -> TransportResult<MemoryConnection> {
        if !self.hub.available.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable {
                message: "memory broker is down".to_string(),
            });
        }
        self.hub.connects.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConnection {
            hub: self.hub.clone(),
            generation: self.hub.generation.load(Ordering::SeqCst),
            healthy: true,
        })
    }
}

/// Command connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    hub: Arc<Hub>,
    generation: u64,
    healthy: bool,
}

impl MemoryConnection {
    fn check(&mut self) -> TransportResult<()> {
        if self.healthy && self.hub.is_live(self.generation) {
            Ok(())
        } else {
            self.healthy = false;
            Err(TransportError::ConnectionClosed)
        }
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    type Subscription = MemorySubscription;

    async fn ping(&mut self) -> TransportResult<()> {
        self.check()
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> TransportResult<u64> {
        self.check()?;
        Ok(self.hub.deliver(channel, payload))
    }

    async fn subscribe(mut self, channels: &[String]) -> TransportResult<MemorySubscription> {
        self.check()?;
        let id = self.hub.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut map = self.hub.channels();
            for channel in channels {
                map.entry(channel.clone()).or_default().push(Subscriber {
                    id,
                    tx: tx.clone(),
                });
            }
        }
        Ok(MemorySubscription {
            hub: self.hub,
            id,
            rx,
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy && self.hub.is_live(self.generation)
    }
}

/// Subscription on a [`MemoryBroker`].
pub struct MemorySubscription {
    hub: Arc<Hub>,
    id: u64,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
}

#[async_trait]
impl BrokerSubscription for MemorySubscription {
    async fn next_message(&mut self) -> TransportResult<Option<ChannelMessage>> {
        Ok(self.rx.recv().await)
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
