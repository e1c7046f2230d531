//! # crosslink-core
//!
//! Core types shared by every crosslink crate.
//!
//! - **Identifiers**: [`NodeId`], [`EntityId`], [`CorrelationId`] and the
//!   case-insensitive [`NameKey`] used for directory lookups
//! - **Codec trait**: Pluggable envelope serialization ([`MessageCodec`],
//!   [`JsonCodec`])
//! - **Clock**: [`unix_millis`] for wire timestamps
//!
//! Nothing in this crate performs I/O.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod codec;
mod time;
mod types;

// Codec exports
pub use codec::{CodecError, JsonCodec, MessageCodec};

// Clock exports
pub use time::unix_millis;

// Identifier exports
pub use types::{CorrelationId, EntityId, NameKey, NodeId};
