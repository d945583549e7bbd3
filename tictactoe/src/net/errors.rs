//! Network error types for payload decoding.

use thiserror::Error;

/// Errors raised while decoding an inbound client payload. These never
/// leave the session: the offending message is dropped.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Opcode outside the fixed enumeration
    #[error("Unknown opcode: {0}")]
    UnknownOpCode(i64),

    /// Opcode that clients may not send
    #[error("Opcode {0} is server-to-client only")]
    UnexpectedOpCode(i64),

    /// Payload size exceeded maximum allowed
    #[error("Payload size {actual} exceeds maximum {max}")]
    PayloadTooLarge { actual: usize, max: usize },

    /// Move payload that is neither `row,col` nor a JSON pair
    #[error("Invalid move payload: {0}")]
    InvalidMove(String),

    /// JSON decoding failure
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for decoding operations
pub type Result<T> = std::result::Result<T, SerializationError>;
