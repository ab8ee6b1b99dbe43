//! Network error types.

use thiserror::Error;

/// Network errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Malformed message on the wire.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Message exceeds the configured size limit.
    #[error("message too large: {size} bytes, max {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Unknown message code.
    #[error("unknown message code: {0}")]
    UnknownMessageCode(u8),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
