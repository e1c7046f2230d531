//! Error types for the crosslink layer.

use std::path::PathBuf;

use crosslink_core::CodecError;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`CrosslinkConfig`].
    ///
    /// [`CrosslinkConfig`]: crate::CrosslinkConfig
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Errors raised while turning bytes into envelopes and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not a well-formed envelope of a known type.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] CodecError),

    /// Envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] CodecError),
}
