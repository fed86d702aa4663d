//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest and applied to both the
//! model and the harness.

use studyroom_proto::ErrorCode;

/// Client identifier (0-indexed).
pub type ClientId = u8;

/// Room identifier (u8 keeps the room space small enough to collide).
pub type ModelRoomId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Client joins a room and receives its history.
    Join {
        /// Client joining.
        client_id: ClientId,
        /// Room to join.
        room_id: ModelRoomId,
    },

    /// Client leaves a room.
    Leave {
        /// Client leaving.
        client_id: ClientId,
        /// Room to leave.
        room_id: ModelRoomId,
    },

    /// Client posts a message. Content is assigned by the model.
    Send {
        /// Client sending.
        client_id: ClientId,
        /// Target room (need not be joined).
        room_id: ModelRoomId,
    },

    /// Client deletes a live message, chosen by `pick` modulo the live count.
    Delete {
        /// Client deleting.
        client_id: ClientId,
        /// Selector into live messages.
        pick: u8,
    },

    /// Client's connection drops.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// Client opens a new connection and authenticates.
    Reconnect {
        /// Client reconnecting.
        client_id: ClientId,
    },
}

impl Operation {
    /// Client performing the operation.
    pub fn client_id(&self) -> ClientId {
        match self {
            Self::Join { client_id, .. }
            | Self::Leave { client_id, .. }
            | Self::Send { client_id, .. }
            | Self::Delete { client_id, .. }
            | Self::Disconnect { client_id }
            | Self::Reconnect { client_id } => *client_id,
        }
    }
}

/// Outcome of applying an operation to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The operation took effect.
    Applied,
    /// The operation was rejected with an `error` reply to the client.
    Rejected(ErrorCode),
    /// Preconditions not met (client offline, nothing to delete); the real
    /// system must not be driven either.
    Skipped,
}
