//! Per-connection session state machine.
//!
//! One [`ConnectionSession`] exists per live socket, owned by the gateway and
//! keyed by session id. It replaces identity fields bolted onto the transport
//! object with a typed state value.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────────┐  authenticate ok   ┌───────────────┐
//! │ Unauthenticated │───────────────────>│ Authenticated │──┐ join / leave
//! └─────────────────┘                    └───────────────┘<─┘
//!          │ invalid token / disconnect          │ disconnect
//!          ↓                                     ↓
//!     ┌────────┐                            ┌────────┐
//!     │ Closed │                            │ Closed │
//!     └────────┘                            └────────┘
//! ```
//!
//! Identity never changes once set. The joined-room set is only mutable while
//! authenticated and is drained when the session closes, so the caller can
//! clean the room index with exactly the rooms this session held.

use std::collections::BTreeSet;

use studyroom_proto::{RoomId, UserId};

use crate::error::SessionError;

/// Authentication state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state; only `authenticate` is accepted.
    Unauthenticated,
    /// Token verified; identity is fixed for the life of the connection.
    Authenticated {
        /// Verified account id
        user_id: UserId,
    },
    /// Connection closed (disconnect or rejected token). Terminal.
    Closed,
}

/// Session record for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    session_id: u64,
    state: SessionState,
    joined: BTreeSet<RoomId>,
}

impl ConnectionSession {
    /// Create a session in [`SessionState::Unauthenticated`].
    pub fn new(session_id: u64) -> Self {
        Self { session_id, state: SessionState::Unauthenticated, joined: BTreeSet::new() }
    }

    /// Session id assigned by the runtime.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Verified identity, if authenticated.
    pub fn user_id(&self) -> Option<&UserId> {
        match &self.state {
            SessionState::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }

    /// Whether the session has not been closed.
    pub fn is_live(&self) -> bool {
        self.state != SessionState::Closed
    }

    /// Bind a verified identity.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyAuthenticated` if an identity is already bound
    /// - `SessionError::Closed` if the session was closed
    pub fn authenticate(&mut self, user_id: UserId) -> Result<(), SessionError> {
        match &self.state {
            SessionState::Unauthenticated => {
                self.state = SessionState::Authenticated { user_id };
                Ok(())
            },
            SessionState::Authenticated { user_id } => {
                Err(SessionError::AlreadyAuthenticated { user_id: user_id.clone() })
            },
            SessionState::Closed => Err(SessionError::Closed { operation: "authenticate" }),
        }
    }

    /// Identity for an operation that requires authentication.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAuthenticated` while unauthenticated
    /// - `SessionError::Closed` after close
    pub fn require_user(&self, operation: &'static str) -> Result<&UserId, SessionError> {
        match &self.state {
            SessionState::Authenticated { user_id } => Ok(user_id),
            SessionState::Unauthenticated => Err(SessionError::NotAuthenticated { operation }),
            SessionState::Closed => Err(SessionError::Closed { operation }),
        }
    }

    /// Add a room to the joined set. Returns `true` if newly joined.
    pub fn join(&mut self, room_id: RoomId) -> Result<bool, SessionError> {
        self.require_user("join room")?;
        Ok(self.joined.insert(room_id))
    }

    /// Remove a room from the joined set. Returns `true` if it was joined.
    pub fn leave(&mut self, room_id: &RoomId) -> Result<bool, SessionError> {
        self.require_user("leave room")?;
        Ok(self.joined.remove(room_id))
    }

    /// Whether the session has joined `room_id`.
    pub fn has_joined(&self, room_id: &RoomId) -> bool {
        self.joined.contains(room_id)
    }

    /// Rooms currently joined, in id order.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomId> + '_ {
        self.joined.iter()
    }

    /// Close the session and return the rooms it had joined.
    ///
    /// Idempotent: closing twice returns an empty set the second time.
    pub fn close(&mut self) -> BTreeSet<RoomId> {
        self.state = SessionState::Closed;
        std::mem::take(&mut self.joined)
    }
}
