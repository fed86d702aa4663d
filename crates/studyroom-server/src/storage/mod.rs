//! Message storage.
//!
//! Trait-based abstraction for persisting chat messages. The trait is
//! synchronous (no async); the gateway moves each call onto Tokio's blocking
//! pool so a slow backend stalls only the event that issued it.
//!
//! Every backend assigns ids and timestamps the same way, through
//! [`IdAllocator`]: timestamps are clamped to never run backwards, and the
//! sequence number makes ids unique even within one millisecond.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};

pub use self::redb::RedbStorage;

/// Storage abstraction for chat messages.
///
/// Must be Clone (shared between the gateway and HTTP handlers), Send + Sync
/// (thread-safe), and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock).
pub trait MessageStore: Clone + Send + Sync + 'static {
    /// Persist a new message and return the stored record.
    ///
    /// `now_millis` is the caller's wall clock. The stored timestamp is
    /// `max(now_millis, last assigned timestamp)`.
    ///
    /// # Invariants
    ///
    /// - Post: the returned id is strictly greater than every id this store
    ///   assigned before
    /// - Post: on error nothing was persisted
    fn append(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
        now_millis: u64,
    ) -> Result<ChatMessage, StorageError>;

    /// All messages of a room, ascending by (timestamp, id).
    ///
    /// Unknown rooms yield an empty vector.
    fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, StorageError>;

    /// Look up a single message. `None` if it does not exist.
    fn find_by_id(&self, message_id: MessageId) -> Result<Option<ChatMessage>, StorageError>;

    /// Remove a message and return the removed record.
    ///
    /// # Errors
    ///
    /// - `StorageError::MessageNotFound` if no such message exists
    fn delete_by_id(&self, message_id: MessageId) -> Result<ChatMessage, StorageError>;

    /// Number of messages currently stored for a room.
    fn message_count(&self, room_id: &RoomId) -> Result<usize, StorageError>;
}

/// Id and timestamp allocation state shared by all backends.
///
/// Persisted by durable backends so ids stay unique across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    last_timestamp: u64,
    next_sequence: u64,
}

impl IdAllocator {
    /// Restore allocator state.
    pub fn from_parts(last_timestamp: u64, next_sequence: u64) -> Self {
        Self { last_timestamp, next_sequence }
    }

    /// Assign `(timestamp, id)` for a message created at `now_millis`.
    pub fn allocate(&mut self, now_millis: u64) -> (u64, MessageId) {
        let timestamp = now_millis.max(self.last_timestamp);
        let id = MessageId::from_parts(timestamp, self.next_sequence);

        self.last_timestamp = timestamp;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        (timestamp, id)
    }

    /// Highest timestamp handed out so far.
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Sequence number the next message will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
