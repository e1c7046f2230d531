//! Publish/subscribe facade over a pooled broker.
//!
//! # Architecture
//!
//! ```text
//!   publish(channel, payload) ──spawn──► checkout ─► PUBLISH ─► return conn
//!          │
//!          └──► PublishHandle (await → bool)
//!
//!   subscribe(handler, channels) ──spawn──► worker task
//!                                            │ checkout + detach
//!                                            │ SUBSCRIBE
//!                                            ▼
//!                            loop { select! { cancelled, next_message } }
//!                                            │
//!                                            ▼
//!                            handler.on_message(channel, payload)   (serial)
//! ```
//!
//! The transport knows nothing about what payloads mean. Every failure is
//! logged and surfaces as a `false` return, a `None` subscription or a
//! finished worker; nothing is retried and nothing is buffered.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = PubSubTransport::new(RedisBroker::new(broker_cfg), PoolConfig::default());
//! if !transport.initialize().await {
//!     // cross-node features stay off for this process
//! }
//! let sub = transport.subscribe(Arc::new(MyHandler), vec!["chat".into()]);
//! let delivered: bool = transport.publish("chat", b"hi".to_vec()).await;
//! transport.shutdown();
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, BrokerConnection, BrokerSubscription};
use crate::config::PoolConfig;
use crate::error::TransportResult;
use crate::metrics::{MetricsSnapshot, TransportMetrics};
use crate::pool::ConnectionPool;

/// Receives messages from a subscription.
///
/// Called serially from the subscription's worker task, so a slow handler
/// delays later messages on the same subscription but never blocks other
/// subscriptions or publishers. A panic inside `on_message` is caught and
/// logged; the subscription keeps running.
pub trait MessageHandler: Send + Sync + 'static {
    /// One message arrived on `channel`.
    fn on_message(&self, channel: &str, payload: &[u8]);

    /// The subscription is live on `channels`.
    fn on_subscribe(&self, channels: &[String]) {
        let _ = channels;
    }

    /// The subscription ended (unsubscribe, shutdown or lost connection).
    fn on_unsubscribe(&self, channels: &[String]) {
        let _ = channels;
    }
}

struct Inner<B: Broker> {
    pool: Arc<ConnectionPool<B>>,
    connected: AtomicBool,
    shutting_down: AtomicBool,
    shutdown: CancellationToken,
    metrics: TransportMetrics,
}

/// Connection-pooled publish/subscribe access to a broker.
///
/// Cheap to clone; clones share the pool, the shutdown flag and the
/// metrics.
pub struct PubSubTransport<B: Broker> {
    inner: Arc<Inner<B>>,
}

impl<B: Broker> Clone for PubSubTransport<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Broker> PubSubTransport<B> {
    /// Create a transport. Nothing connects until [`initialize`](Self::initialize).
    pub fn new(broker: B, pool: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: ConnectionPool::new(Arc::new(broker), pool),
                connected: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                metrics: TransportMetrics::default(),
            }),
        }
    }

    /// Probe the broker once with a ping round trip and pre-warm the pool.
    ///
    /// Returns `false` when the broker is unreachable. Callers treat that
    /// as "cross-node features disabled for this process"; there is no
    /// retry.
    pub async fn initialize(&self) -> bool {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        match self.probe().await {
            Ok(()) => {
                let warmed = self.inner.pool.prewarm().await;
                self.inner.connected.store(true, Ordering::SeqCst);
                info!(prewarmed = warmed, "broker connection established");
                true
            }
            Err(e) => {
                error!(error = %e, "broker unreachable, cross-node messaging disabled");
                false
            }
        }
    }

    async fn probe(&self) -> TransportResult<()> {
        let mut conn = self.inner.pool.checkout().await?;
        conn.ping().await
    }

    /// Whether [`initialize`](Self::initialize) succeeded and shutdown has
    /// not started.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
            && !self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Publish `payload` on `channel` from a background task.
    ///
    /// Returns immediately. The handle resolves to `true` once the broker
    /// accepted the message, `false` when the transport is not connected,
    /// is shutting down, or the publish failed. Dropping the handle does not
    /// cancel the publish.
    pub fn publish(&self, channel: impl Into<String>, payload: Vec<u8>) -> PublishHandle {
        let channel = channel.into();
        if !self.is_connected() {
            debug!(%channel, "publish skipped, transport not connected");
            self.inner.metrics.record_publish_failed();
            return PublishHandle::ready(false);
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = async {
                let mut conn = inner.pool.checkout().await?;
                conn.publish(&channel, &payload).await
            }
            .await;
            match result {
                Ok(receivers) => {
                    debug!(%channel, receivers, bytes = payload.len(), "published");
                    inner.metrics.record_published();
                    true
                }
                Err(e) => {
                    if !inner.shutting_down.load(Ordering::SeqCst) {
                        warn!(%channel, error = %e, "publish failed");
                    }
                    inner.metrics.record_publish_failed();
                    false
                }
            }
        });
        PublishHandle::spawned(task)
    }

    /// Start a subscription worker for `channels`.
    ///
    /// Returns `None` when the transport is not connected or is shutting
    /// down. The worker holds one pooled connection until the subscription
    /// ends.
    pub fn subscribe(
        &self,
        handler: Arc<dyn MessageHandler>,
        channels: Vec<String>,
    ) -> Option<SubscriptionHandle> {
        if !self.is_connected() {
            warn!(?channels, "subscribe skipped, transport not connected");
            return None;
        }

        let token = self.inner.shutdown.child_token();
        let inner = Arc::clone(&self.inner);
        let worker_token = token.clone();
        let worker_channels = channels.clone();
        let task = tokio::spawn(async move {
            run_subscription(inner, handler, worker_channels, worker_token).await;
        });

        Some(SubscriptionHandle {
            token,
            task,
            channels,
        })
    }

    /// Stop accepting work, end every subscription and close the pool.
    ///
    /// Publishes already spawned finish or fail on their own.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("transport shutting down");
        self.inner.shutdown.cancel();
        self.inner.pool.close();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

async fn run_subscription<B: Broker>(
    inner: Arc<Inner<B>>,
    handler: Arc<dyn MessageHandler>,
    channels: Vec<String>,
    token: CancellationToken,
) {
    let pooled = tokio::select! {
        _ = token.cancelled() => return,
        result = inner.pool.checkout() => match result {
            Ok(conn) => conn,
            Err(e) => {
                error!(?channels, error = %e, "subscription could not get a connection");
                return;
            }
        },
    };
    let Some((conn, _permit)) = pooled.detach() else {
        return;
    };

    let mut subscription = tokio::select! {
        _ = token.cancelled() => return,
        result = conn.subscribe(&channels) => match result {
            Ok(sub) => sub,
            Err(e) => {
                error!(?channels, error = %e, "subscribe failed");
                return;
            }
        },
    };

    debug!(?channels, "subscription worker started");
    handler.on_subscribe(&channels);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = subscription.next_message() => match next {
                Ok(Some(message)) => {
                    inner.metrics.record_received();
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        handler.on_message(&message.channel, &message.payload)
                    }));
                    if outcome.is_err() {
                        inner.metrics.record_handler_panic();
                        error!(channel = %message.channel, "message handler panicked");
                    }
                }
                Ok(None) => {
                    if !inner.shutting_down.load(Ordering::SeqCst) {
                        warn!(?channels, "subscription connection closed by broker");
                    }
                    break;
                }
                Err(e) => {
                    if !inner.shutting_down.load(Ordering::SeqCst) {
                        error!(?channels, error = %e, "subscription failed");
                    }
                    break;
                }
            },
        }
    }

    handler.on_unsubscribe(&channels);
    debug!(?channels, "subscription worker stopped");
}

/// Pending result of [`PubSubTransport::publish`].
pub struct PublishHandle {
    state: PublishState,
}

enum PublishState {
    Ready(Option<bool>),
    Spawned(JoinHandle<bool>),
}

impl PublishHandle {
    /// A handle that is already resolved to `value`.
    pub fn ready(value: bool) -> Self {
        Self {
            state: PublishState::Ready(Some(value)),
        }
    }

    fn spawned(task: JoinHandle<bool>) -> Self {
        Self {
            state: PublishState::Spawned(task),
        }
    }
}

impl Future for PublishHandle {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        match &mut self.state {
            PublishState::Ready(value) => Poll::Ready(value.take().unwrap_or(false)),
            // A panicked or aborted publish task counts as a failed publish.
            PublishState::Spawned(task) => Pin::new(task).poll(cx).map(|r| r.unwrap_or(false)),
        }
    }
}

/// Handle to a running subscription worker.
///
/// Dropping the handle leaves the worker running until transport shutdown.
pub struct SubscriptionHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    channels: Vec<String>,
}

impl SubscriptionHandle {
    /// Ask the worker to stop. It calls `on_unsubscribe` and releases its
    /// connection.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Whether the worker is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Channels this subscription listens on.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Wait for the worker to finish.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}
