//! Gateway error types.
//!
//! Provides strongly-typed errors for chat gateway operations:
//! - Per-event rejections (bad token, not authenticated, not the sender)
//! - Storage failures surfaced from the message store
//! - Session bookkeeping (unknown or duplicate session ids)
//!
//! Every variant maps to a wire [`ErrorCode`] so rejections can be echoed to
//! the requesting session.

use std::fmt;

use studyroom_core::SessionError;
use studyroom_proto::{ErrorCode, MessageId, ProtocolError, UserId};

use crate::{auth::AuthError, storage::StorageError};

/// Errors that can occur while handling a gateway event.
#[derive(Debug)]
pub enum GatewayError {
    /// Bearer token was rejected.
    ///
    /// On the socket path this closes the connection; no retry on the same
    /// connection.
    InvalidToken,

    /// Session state does not allow the operation.
    ///
    /// Not authenticated yet, already authenticated, or closed. The session
    /// stays open.
    Session(SessionError),

    /// Caller tried to delete a message sent by someone else.
    NotSender {
        /// Message that was targeted
        message_id: MessageId,
        /// Identity of the caller
        user_id: UserId,
    },

    /// Referenced message does not exist.
    MessageNotFound(MessageId),

    /// Event payload failed validation (empty room id, empty or oversize
    /// content).
    InvalidPayload(String),

    /// Inbound frame could not be decoded.
    Protocol(ProtocolError),

    /// Message store operation failed.
    ///
    /// The event is dropped; nothing was broadcast.
    Storage(StorageError),

    /// Session not found.
    ///
    /// The connection closed while its event was in flight. Not reported to
    /// anyone: there is nobody left to tell.
    SessionNotFound(u64),

    /// Session already registered.
    ///
    /// Session ids must be unique. This is a runtime bug.
    SessionAlreadyExists(u64),
}

impl GatewayError {
    /// Wire code for an `error` reply.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::Session(SessionError::AlreadyAuthenticated { .. }) => {
                ErrorCode::AlreadyAuthenticated
            },
            Self::Session(_) | Self::NotSender { .. } | Self::SessionNotFound(_) => {
                ErrorCode::Unauthorized
            },
            Self::MessageNotFound(_) | Self::Storage(StorageError::MessageNotFound(_)) => {
                ErrorCode::NotFound
            },
            Self::InvalidPayload(_) | Self::Protocol(_) => ErrorCode::InvalidPayload,
            Self::Storage(_) | Self::SessionAlreadyExists(_) => ErrorCode::Persistence,
        }
    }

    /// Text for an `error` reply.
    ///
    /// Storage details stay in the server log.
    pub fn reply_message(&self) -> String {
        match self {
            Self::Storage(StorageError::MessageNotFound(id)) => format!("message not found: {id}"),
            Self::Storage(_) => "storage unavailable, message not saved".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "invalid token"),
            Self::Session(err) => write!(f, "{err}"),
            Self::NotSender { message_id, user_id } => {
                write!(f, "user {user_id} is not the sender of message {message_id}")
            },
            Self::MessageNotFound(id) => write!(f, "message not found: {id}"),
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            Self::Protocol(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MessageNotFound(id) => Self::MessageNotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<ProtocolError> for GatewayError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<AuthError> for GatewayError {
    fn from(_: AuthError) -> Self {
        Self::InvalidToken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(GatewayError::InvalidToken.code(), ErrorCode::InvalidToken);
        assert_eq!(
            GatewayError::Session(SessionError::NotAuthenticated { operation: "join room" })
                .code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            GatewayError::Session(SessionError::AlreadyAuthenticated {
                user_id: UserId::new("u1")
            })
            .code(),
            ErrorCode::AlreadyAuthenticated
        );
        assert_eq!(
            GatewayError::from(StorageError::Io("disk".into())).code(),
            ErrorCode::Persistence
        );
        assert_eq!(
            GatewayError::from(StorageError::MessageNotFound(MessageId::from_parts(1, 1))).code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn storage_details_stay_out_of_replies() {
        let err = GatewayError::from(StorageError::Io("/var/db/chat.redb: disk full".into()));
        assert!(!err.reply_message().contains("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
