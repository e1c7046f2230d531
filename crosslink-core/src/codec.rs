//! Pluggable envelope serialization.
//!
//! The [`MessageCodec`] trait decouples the envelope protocol from its byte
//! representation. Every node on a broker must agree on one codec; the
//! default [`JsonCodec`] produces one JSON object per payload, which keeps
//! broker traffic readable from `redis-cli MONITOR`.
//!
//! # Example
//!
//! ```rust
//! use crosslink_core::{JsonCodec, MessageCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! let codec = JsonCodec;
//! let bytes = codec.encode(&Ping { seq: 7 }).unwrap();
//! assert_eq!(&bytes, br#"{"seq":7}"#);
//!
//! let decoded: Ping = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, Ping { seq: 7 });
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a value to bytes.
    #[error("encode error: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to decode bytes to a value.
    #[error("decode error: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Serialization format for envelopes on the wire.
///
/// The trait requires `Clone + Send + Sync + 'static` so one codec instance
/// can be shared by the publisher, every subscription worker and the lookup
/// timeout tasks.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// Encode a serializable value to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable value.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the bytes are not a valid `T`.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Presence {
        name: String,
        online: bool,
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec;
        let msg = Presence {
            name: "alice".to_string(),
            online: true,
        };

        let bytes = codec.encode(&msg).expect("encode");
        let decoded: Presence = codec.decode(&bytes).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec;
        let result: Result<Presence, _> = codec.decode(b"not json at all");
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_json_codec_rejects_missing_field() {
        let codec = JsonCodec;
        let result: Result<Presence, _> = codec.decode(br#"{"name":"bob"}"#);
        let err = result.expect_err("missing field must fail");
        assert!(err.to_string().starts_with("decode error"));
    }
}
