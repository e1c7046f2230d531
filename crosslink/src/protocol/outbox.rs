//! Outbound side of the envelope protocol.

use std::sync::Arc;

use crosslink_core::{CorrelationId, JsonCodec, MessageCodec, NodeId};
use crosslink_transport::{Broker, PubSubTransport, PublishHandle};
use tracing::{error, trace};

use super::envelope::{Envelope, Payload};
use crate::error::ProtocolError;

/// Anything that can put bytes on a channel.
///
/// Implemented for [`PubSubTransport`]; services depend on this seam so
/// they stay independent of the broker type.
pub trait Publisher: Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    fn publish(&self, channel: &str, payload: Vec<u8>) -> PublishHandle;

    /// Whether publishes can currently succeed.
    fn is_connected(&self) -> bool;
}

impl<B: Broker> Publisher for PubSubTransport<B> {
    fn publish(&self, channel: &str, payload: Vec<u8>) -> PublishHandle {
        PubSubTransport::publish(self, channel, payload)
    }

    fn is_connected(&self) -> bool {
        PubSubTransport::is_connected(self)
    }
}

/// Stamps payloads with this node's id and publishes them.
#[derive(Clone)]
pub struct Outbox {
    node_id: NodeId,
    publisher: Arc<dyn Publisher>,
    codec: JsonCodec,
}

impl Outbox {
    /// Outbox for `node_id` publishing through `publisher`.
    pub fn new(node_id: NodeId, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            node_id,
            publisher,
            codec: JsonCodec,
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Whether the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Publish a broadcast envelope.
    pub fn broadcast(&self, channel: &str, payload: Payload) -> PublishHandle {
        self.send(channel, Envelope::new(self.node_id.clone(), payload))
    }

    /// Publish an envelope addressed to `target`.
    pub fn send_to(&self, channel: &str, target: &NodeId, payload: Payload) -> PublishHandle {
        self.send(
            channel,
            Envelope::new(self.node_id.clone(), payload).to(target.clone()),
        )
    }

    /// Publish a lookup-style envelope carrying `correlation_id`.
    pub fn send_correlated(
        &self,
        channel: &str,
        target: Option<&NodeId>,
        correlation_id: CorrelationId,
        payload: Payload,
    ) -> PublishHandle {
        let mut envelope =
            Envelope::new(self.node_id.clone(), payload).with_correlation(correlation_id);
        envelope.target_node = target.cloned();
        self.send(channel, envelope)
    }

    /// Encode and publish a prepared envelope.
    pub fn send(&self, channel: &str, envelope: Envelope) -> PublishHandle {
        match self.encode(&envelope) {
            Ok(bytes) => {
                trace!(%channel, kind = envelope.payload.kind(), "sending envelope");
                self.publisher.publish(channel, bytes)
            }
            Err(e) => {
                error!(%channel, error = %e, "dropping envelope");
                PublishHandle::ready(false)
            }
        }
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        self.codec.encode(envelope).map_err(ProtocolError::Encode)
    }

    /// Decode an inbound envelope.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Malformed` when the bytes are not a known envelope.
    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope, ProtocolError> {
        self.codec.decode(bytes).map_err(ProtocolError::Malformed)
    }
}
