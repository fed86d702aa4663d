//! Error types for the chat core.
//!
//! Strongly-typed errors for the session state machine and the OTP store.
//! Each variant names the operation that was refused so the gateway can log
//! it without re-deriving context.

use studyroom_proto::UserId;
use thiserror::Error;

/// Errors from [`crate::session::ConnectionSession`] transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation requires an authenticated session.
    #[error("cannot {operation}: session is not authenticated")]
    NotAuthenticated {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Identity is fixed for the life of the connection.
    #[error("session is already authenticated as {user_id}")]
    AlreadyAuthenticated {
        /// Identity the session already carries
        user_id: UserId,
    },

    /// Session was closed; no further transitions are accepted.
    #[error("cannot {operation}: session is closed")]
    Closed {
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors from [`crate::otp::OtpStore::verify`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpError {
    /// No code was issued for this address (or it was already used).
    #[error("no pending code")]
    NotFound,

    /// The code's deadline has passed; the entry has been discarded.
    #[error("code expired")]
    Expired,

    /// The code does not match. The entry is kept for another attempt.
    #[error("code mismatch")]
    Mismatch,
}
