//! Envelope protocol.
//!
//! Every cross-node message is an [`Envelope`]: a header naming the origin
//! node, an optional target node and correlation id, and one [`Payload`]
//! out of a closed set. The [`Outbox`] stamps and publishes envelopes; the
//! [`Dispatcher`] decodes inbound ones, applies loop prevention and routes
//! each payload to its service with an exhaustive `match`.

mod dispatch;
mod envelope;
mod outbox;

pub use dispatch::Dispatcher;
pub(crate) use dispatch::Routes;
pub use envelope::{
    ChatSource, Envelope, ListedEntity, Payload, PresenceKind, ProtocolGroup, Routing,
};
pub use outbox::{Outbox, Publisher};

#[cfg(test)]
pub(crate) use outbox::testing;
