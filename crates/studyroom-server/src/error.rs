//! Server error types.

use std::fmt;

use crate::{auth::AuthError, gateway_error::GatewayError, storage::StorageError};

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, empty JWT secret, etc.).
    ///
    /// Fatal: prevents startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept loop failure).
    Transport(String),

    /// Message store could not be opened.
    Storage(StorageError),

    /// Gateway bookkeeping error.
    ///
    /// Indicates a runtime bug (e.g. a reused session id). Fatal for that
    /// connection; the server keeps serving others.
    Gateway(GatewayError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Gateway(err) => write!(f, "gateway error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
