//! Error types for the transport layer.

use std::time::Duration;

use crate::resp::RespError;

/// Errors raised while talking to the broker.
///
/// None of these are fatal to the host process: [`PubSubTransport`]
/// turns them into a `false` return or a terminated subscription and logs
/// the cause.
///
/// [`PubSubTransport`]: crate::PubSubTransport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the broker at all.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Details about the failure.
        message: String,
    },

    /// TCP connect did not finish in time.
    #[error("connect timed out after {timeout:?}")]
    ConnectTimeout {
        /// The configured connect timeout.
        timeout: Duration,
    },

    /// The broker did not answer a command in time.
    #[error("broker response timed out after {timeout:?}")]
    ResponseTimeout {
        /// The configured response timeout.
        timeout: Duration,
    },

    /// The broker closed the connection.
    #[error("connection closed by broker")]
    ConnectionClosed,

    /// The broker answered with an error reply.
    #[error("broker error: {message}")]
    Broker {
        /// Error text sent by the broker.
        message: String,
    },

    /// The broker answered with a reply of the wrong shape.
    #[error("unexpected reply: {reply}")]
    UnexpectedReply {
        /// Debug rendering of the reply.
        reply: String,
    },

    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] RespError),

    /// No pooled connection became available in time.
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted {
        /// How long the checkout waited.
        waited: Duration,
    },

    /// The pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,

    /// The transport is shutting down and rejects new work.
    #[error("transport is shutting down")]
    ShuttingDown,

    /// Pool or broker settings are inconsistent.
    #[error("invalid transport config: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
