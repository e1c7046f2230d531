//! Redis-compatible broker over RESP.
//!
//! Each [`RedisConnection`] owns one TCP stream. Commands are strictly
//! request/response; a response timeout or any I/O error marks the
//! connection unhealthy because a late reply would desynchronize the
//! stream.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{Broker, BrokerConnection, BrokerSubscription, ChannelMessage};
use crate::config::BrokerConfig;
use crate::error::{TransportError, TransportResult};
use crate::resp::{self, RespValue};

const READ_CHUNK: usize = 8 * 1024;

/// Broker backed by a Redis-compatible server.
#[derive(Clone, Debug)]
pub struct RedisBroker {
    config: BrokerConfig,
}

impl RedisBroker {
    /// Create a broker for the given server settings. Nothing connects yet.
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// The server settings.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

#[async_trait]
impl Broker for RedisBroker {
    type Connection = RedisConnection;

    async fn connect(&self) -> TransportResult<RedisConnection> {
        let cfg = &self.config;
        let timeout = cfg.connect_timeout();
        let stream = tokio::time::timeout(
            timeout,
            TcpStream::connect((cfg.host.as_str(), cfg.port)),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout { timeout })?
        .map_err(|e| TransportError::Unavailable {
            message: format!("{}:{}: {}", cfg.host, cfg.port, e),
        })?;
        stream.set_nodelay(true)?;

        let mut conn = RedisConnection::new(stream, cfg.response_timeout());

        if let Some(password) = &cfg.password {
            let reply = match &cfg.username {
                Some(user) => {
                    conn.command(&[b"AUTH", user.as_bytes(), password.as_bytes()])
                        .await?
                }
                None => conn.command(&[b"AUTH", password.as_bytes()]).await?,
            };
            expect_ok(reply)?;
        }

        if cfg.database != 0 {
            let db = cfg.database.to_string();
            expect_ok(conn.command(&[b"SELECT", db.as_bytes()]).await?)?;
        }

        debug!(host = %cfg.host, port = cfg.port, "connected to broker");
        Ok(conn)
    }
}

fn expect_ok(reply: RespValue) -> TransportResult<()> {
    match reply {
        RespValue::Simple(ref s) if s == "OK" => Ok(()),
        other => Err(TransportError::UnexpectedReply {
            reply: format!("{:?}", other),
        }),
    }
}

/// One command connection to the server.
#[derive(Debug)]
pub struct RedisConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    response_timeout: Duration,
    healthy: bool,
}

impl RedisConnection {
    fn new(stream: TcpStream, response_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
            response_timeout,
            healthy: true,
        }
    }

    /// Send one command and wait for its reply.
    ///
    /// Error replies from the server become `TransportError::Broker` and
    /// leave the connection healthy.
    async fn command(&mut self, args: &[&[u8]]) -> TransportResult<RespValue> {
        let timeout = self.response_timeout;
        let result = tokio::time::timeout(timeout, self.roundtrip(args)).await;
        match result {
            Ok(Ok(RespValue::Error(message))) => Err(TransportError::Broker { message }),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.healthy = false;
                Err(e)
            }
            Err(_) => {
                self.healthy = false;
                Err(TransportError::ResponseTimeout { timeout })
            }
        }
    }

    async fn roundtrip(&mut self, args: &[&[u8]]) -> TransportResult<RespValue> {
        self.write(args).await?;
        self.read_value().await
    }

    async fn write(&mut self, args: &[&[u8]]) -> TransportResult<()> {
        self.write_buf.clear();
        resp::encode_command(args, &mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Read one full value. Cancel-safe: partial frames stay in `read_buf`.
    async fn read_value(&mut self) -> TransportResult<RespValue> {
        loop {
            if let Some(value) = resp::decode(&mut self.read_buf)? {
                trace!(?value, "broker reply");
                return Ok(value);
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    type Subscription = RedisSubscription;

    async fn ping(&mut self) -> TransportResult<()> {
        match self.command(&[b"PING"]).await? {
            RespValue::Simple(ref s) if s == "PONG" => Ok(()),
            other => Err(TransportError::UnexpectedReply {
                reply: format!("{:?}", other),
            }),
        }
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> TransportResult<u64> {
        match self
            .command(&[b"PUBLISH", channel.as_bytes(), payload])
            .await?
        {
            RespValue::Integer(n) => Ok(n.max(0) as u64),
            other => Err(TransportError::UnexpectedReply {
                reply: format!("{:?}", other),
            }),
        }
    }

    async fn subscribe(mut self, channels: &[String]) -> TransportResult<RedisSubscription> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(channels.len() + 1);
        args.push(b"SUBSCRIBE");
        args.extend(channels.iter().map(|c| c.as_bytes()));
        self.write(&args).await?;

        // One confirmation per channel, in order.
        let timeout = self.response_timeout;
        for _ in channels {
            let reply = tokio::time::timeout(timeout, self.read_value())
                .await
                .map_err(|_| TransportError::ResponseTimeout { timeout })??;
            match push_kind(&reply) {
                Some("subscribe") => {}
                _ => {
                    return Err(TransportError::UnexpectedReply {
                        reply: format!("{:?}", reply),
                    })
                }
            }
        }

        debug!(?channels, "subscribed");
        Ok(RedisSubscription { conn: self })
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}

/// First element of a push frame, e.g. `message` or `subscribe`.
fn push_kind(value: &RespValue) -> Option<&str> {
    match value {
        RespValue::Array(Some(items)) => items.first().and_then(RespValue::as_str),
        _ => None,
    }
}

/// A connection in subscriber mode.
pub struct RedisSubscription {
    conn: RedisConnection,
}

#[async_trait]
impl BrokerSubscription for RedisSubscription {
    async fn next_message(&mut self) -> TransportResult<Option<ChannelMessage>> {
        loop {
            let value = match self.conn.read_value().await {
                Ok(value) => value,
                Err(TransportError::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e),
            };
            if push_kind(&value) != Some("message") {
                trace!(?value, "ignoring non-message push");
                continue;
            }
            let RespValue::Array(Some(items)) = value else {
                continue;
            };
            let mut items = items.into_iter().skip(1);
            let channel = items.next().and_then(|v| v.as_str().map(str::to_owned));
            let payload = items.next().and_then(RespValue::into_bytes);
            match (channel, payload) {
                (Some(channel), Some(payload)) => {
                    return Ok(Some(ChannelMessage { channel, payload }))
                }
                _ => {
                    return Err(TransportError::UnexpectedReply {
                        reply: "malformed message push".to_string(),
                    })
                }
            }
        }
    }
}
