//! Socket events.
//!
//! Both directions use the same envelope, `{"event": <name>, "data": <payload>}`,
//! with event names in camelCase (`joinRoom`, `messageDeleted`, ...). Payload
//! fields default to empty when absent so that field validation happens in one
//! place (the gateway) instead of being split between decode and handling.

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    ids::{MessageId, RoomId, UserId},
    message::ChatMessage,
};

/// Events a client sends over its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Present a bearer token. Must precede every other event.
    Authenticate(AuthenticatePayload),
    /// Subscribe to a room and receive its history.
    JoinRoom(RoomPayload),
    /// Unsubscribe from a room.
    LeaveRoom(RoomPayload),
    /// Post a message to a room.
    Message(SendMessagePayload),
    /// Delete one of the caller's own messages.
    DeleteMessage(MessageId),
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Encode as a text frame (used by clients and tests).
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::JoinRoom(_) => "joinRoom",
            Self::LeaveRoom(_) => "leaveRoom",
            Self::Message(_) => "message",
            Self::DeleteMessage(_) => "deleteMessage",
        }
    }
}

/// Payload of `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    /// Signed access token.
    #[serde(default)]
    pub access_token: String,
}

/// Payload of `joinRoom` and `leaveRoom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    /// Room to join or leave.
    #[serde(rename = "groupId", default = "empty_room")]
    pub room_id: RoomId,
}

/// Payload of an inbound `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    /// Target room.
    #[serde(rename = "groupId", default = "empty_room")]
    pub room_id: RoomId,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

fn empty_room() -> RoomId {
    RoomId::new("")
}

/// Events the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Authentication succeeded; sent to the requesting session only.
    Authenticated(AuthenticatedPayload),
    /// Room history in ascending order; sent to the joining session only.
    ChatHistory(Vec<ChatMessage>),
    /// A message was persisted; sent to the whole room.
    Message(ChatMessage),
    /// A message was deleted; sent to the whole room.
    MessageDeleted(MessageId),
    /// An inbound event was rejected; sent to the requesting session only.
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a text frame (used by clients and tests).
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload { code, message: message.into() })
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::ChatHistory(_) => "chatHistory",
            Self::Message(_) => "message",
            Self::MessageDeleted(_) => "messageDeleted",
            Self::Error(_) => "error",
        }
    }
}

/// Payload of `authenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
    /// Identity bound to the connection.
    pub user_id: UserId,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable reason.
    pub code: ErrorCode,
    /// Human-readable detail. Never includes token validation internals.
    pub message: String,
}

/// Reasons an inbound event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Token was malformed, expired, or had a bad signature.
    InvalidToken,
    /// Connection already carries an identity.
    AlreadyAuthenticated,
    /// Not authenticated, or not the message's sender.
    Unauthorized,
    /// Target message does not exist.
    NotFound,
    /// Event failed to decode or failed field validation.
    InvalidPayload,
    /// The message store rejected the operation.
    Persistence,
}
