//! Typed identifiers.
//!
//! Room and user ids are opaque strings issued by the surrounding web app
//! (group ids and account ids). Message ids are minted by the message store.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ProtocolError;

/// Group id identifying a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a group id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Authenticated account id, taken from the verified token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Store-assigned message id.
///
/// The high 64 bits hold the creation timestamp (Unix milliseconds) and the
/// low 64 bits a per-store sequence number, so numeric order is creation
/// order. Rendered as 32 lowercase hex digits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u128);

impl MessageId {
    /// Build an id from its timestamp and sequence components.
    pub fn from_parts(timestamp_millis: u64, sequence: u64) -> Self {
        Self((u128::from(timestamp_millis) << 64) | u128::from(sequence))
    }

    /// Wrap a raw 128-bit id.
    pub fn from_u128(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 128-bit value.
    pub fn as_u128(self) -> u128 {
        self.0
    }

    /// Timestamp component (Unix milliseconds).
    pub fn timestamp_millis(self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Sequence component.
    pub fn sequence(self) -> u64 {
        self.0 as u64
    }

    /// Big-endian bytes, used as a storage key.
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`MessageId::to_be_bytes`].
    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidMessageId(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidMessageId(s.to_string()))
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_parts() {
        let id = MessageId::from_parts(1_700_000_000_000, 7);
        assert_eq!(id.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(id.sequence(), 7);
    }

    #[test]
    fn message_id_orders_by_timestamp_then_sequence() {
        let a = MessageId::from_parts(10, 99);
        let b = MessageId::from_parts(11, 0);
        let c = MessageId::from_parts(11, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn message_id_renders_as_32_hex_digits() {
        let id = MessageId::from_parts(1, 2);
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text, "00000000000000010000000000000002");
        assert_eq!(text.parse::<MessageId>().unwrap(), id);
    }

    #[test]
    fn message_id_rejects_garbage() {
        assert!("".parse::<MessageId>().is_err());
        assert!("xyz".parse::<MessageId>().is_err());
        assert!("0000000000000001000000000000000g".parse::<MessageId>().is_err());
        assert!("+0000000000000001000000000000002".parse::<MessageId>().is_err());
    }

    #[test]
    fn empty_room_ids() {
        assert!(RoomId::new("").is_empty());
        assert!(!RoomId::new("  ").is_empty());
        assert!(!RoomId::new("g1").is_empty());
    }
}
