//! Study-room chat wire protocol.
//!
//! Every socket frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Inbound frames decode into [`ClientEvent`], outbound frames are built from
//! [`ServerEvent`]. The persisted record shape is [`ChatMessage`], shared by
//! the storage layer and the `chatHistory` / `message` events so the two never
//! drift apart.
//!
//! This crate is pure data: no I/O, no clocks. Identifiers are newtypes so a
//! room id can never be passed where a user id is expected.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use events::{
    AuthenticatePayload, AuthenticatedPayload, ClientEvent, ErrorCode, ErrorPayload,
    RoomPayload, SendMessagePayload, ServerEvent,
};
pub use ids::{MessageId, RoomId, UserId};
pub use message::ChatMessage;
