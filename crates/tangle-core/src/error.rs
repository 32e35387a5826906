//! Error types for tangle core values

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Text did not have the `<sigil><base64>.<suffix>` shape
    #[error("invalid sigil: {0}")]
    InvalidSigil(String),

    /// Suffix names no known feed format
    #[error("unknown feed format: {0}")]
    UnknownAlgo(String),

    /// Decoded key or hash was not 32 bytes
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Base64 payload could not be decoded
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Invalid signature
    #[error("signature verification failed")]
    SignatureVerificationFailed,
}
