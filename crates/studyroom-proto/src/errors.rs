//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding wire events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any known event shape.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(String),

    /// Message id was not 32 hex digits.
    #[error("invalid message id: {0:?}")]
    InvalidMessageId(String),
}
