//! Reference model for model-based testing.
//!
//! The model is a few maps and vectors with no locking, no persistence, and
//! no awaits. Tests apply the same [`Operation`] sequence to the model and to
//! a [`crate::ChatHarness`], then compare what every client observed.

mod operation;
mod world;

pub use operation::{ClientId, ModelRoomId, Operation, OperationResult};
pub use world::{ModelMessage, ModelWorld, Observed};

/// Room name used on the wire for a model room.
pub fn room_name(room_id: ModelRoomId) -> String {
    format!("room-{room_id}")
}

/// Account name used for a model client.
pub fn user_name(client_id: ClientId) -> String {
    format!("user-{client_id}")
}

/// Content of the message with sequence number `seq`.
pub fn message_content(seq: u64) -> String {
    format!("m{seq}")
}

/// Inverse of [`message_content`].
pub fn parse_message_content(content: &str) -> Option<u64> {
    content.strip_prefix('m')?.parse().ok()
}

/// Inverse of [`room_name`].
pub fn parse_room_name(name: &str) -> Option<ModelRoomId> {
    name.strip_prefix("room-")?.parse().ok()
}

/// Inverse of [`user_name`].
pub fn parse_user_name(name: &str) -> Option<ClientId> {
    name.strip_prefix("user-")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        assert_eq!(parse_room_name(&room_name(3)), Some(3));
        assert_eq!(parse_user_name(&user_name(2)), Some(2));
        assert_eq!(parse_message_content(&message_content(17)), Some(17));
        assert_eq!(parse_room_name("lobby"), None);
    }
}
