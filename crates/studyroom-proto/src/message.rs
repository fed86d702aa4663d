//! Persisted chat message record.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, UserId};

/// A chat message as stored and as delivered to clients.
///
/// Created by the message store on append and never mutated afterwards. The
/// JSON shape is `{id, groupId, sender, content, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Stable handle used for deletion.
    pub id: MessageId,
    /// Room the message was posted to.
    #[serde(rename = "groupId")]
    pub room_id: RoomId,
    /// Authenticated author.
    pub sender: UserId,
    /// Message text, non-empty.
    pub content: String,
    /// Server-assigned creation time in Unix milliseconds.
    pub timestamp: u64,
}

impl ChatMessage {
    /// History order: timestamp first, id breaks ties.
    pub fn order_key(&self) -> (u64, MessageId) {
        (self.timestamp, self.id)
    }
}
