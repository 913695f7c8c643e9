//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding protocol types.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A journal entry body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A journal entry body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The entry kind byte is not recognised.
    #[error("unknown journal entry kind: {0:#04x}")]
    UnknownEntryKind(u8),

    /// A payload is not valid JSON.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
