//! Storage error types.

use studyroom_proto::MessageId;
use thiserror::Error;

/// Errors from [`super::MessageStore`] backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failed (database, filesystem, blocking pool).
    ///
    /// Transient from the caller's point of view: the event that hit it is
    /// dropped, nothing is retried.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    ///
    /// Indicates corruption or a format change. Fatal for that record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No message with this id exists (never stored, or already deleted).
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
}
