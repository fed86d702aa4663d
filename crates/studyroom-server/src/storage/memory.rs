#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};

use super::{IdAllocator, MessageStore, StorageError};

/// In-memory message store for tests and ephemeral runs.
///
/// Messages are kept per room in a `BTreeMap` keyed by id, so history comes
/// out already ordered. A second index maps id to room for deletion. All state
/// sits behind one `Arc<Mutex<>>`; `lock().expect()` panics on a poisoned
/// mutex, which is acceptable for test code.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// Messages organized by room, ordered by id
    rooms: HashMap<RoomId, BTreeMap<MessageId, ChatMessage>>,

    /// Message id -> owning room
    index: HashMap<MessageId, RoomId>,

    ids: IdAllocator,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    /// Number of rooms with at least one stored message.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn room_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").rooms.len()
    }

    /// Total number of messages across all rooms.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn total_message_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").index.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn append(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
        now_millis: u64,
    ) -> Result<ChatMessage, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let (timestamp, id) = inner.ids.allocate(now_millis);
        let message = ChatMessage {
            id,
            room_id: room_id.clone(),
            sender: sender.clone(),
            content: content.to_string(),
            timestamp,
        };

        inner.rooms.entry(room_id.clone()).or_default().insert(id, message.clone());
        inner.index.insert(id, room_id.clone());

        debug_assert_eq!(
            inner.index.len(),
            inner.rooms.values().map(BTreeMap::len).sum::<usize>()
        );

        Ok(message)
    }

    #[allow(clippy::expect_used)]
    fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner
            .rooms
            .get(room_id)
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default())
    }

    #[allow(clippy::expect_used)]
    fn find_by_id(&self, message_id: MessageId) -> Result<Option<ChatMessage>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let Some(room_id) = inner.index.get(&message_id) else {
            return Ok(None);
        };

        Ok(inner.rooms.get(room_id).and_then(|messages| messages.get(&message_id)).cloned())
    }

    #[allow(clippy::expect_used)]
    fn delete_by_id(&self, message_id: MessageId) -> Result<ChatMessage, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let room_id =
            inner.index.remove(&message_id).ok_or(StorageError::MessageNotFound(message_id))?;

        let not_found = StorageError::MessageNotFound(message_id);
        let messages = inner.rooms.get_mut(&room_id).ok_or_else(|| not_found.clone())?;
        let removed = messages.remove(&message_id).ok_or(not_found)?;

        if messages.is_empty() {
            inner.rooms.remove(&room_id);
        }

        Ok(removed)
    }

    #[allow(clippy::expect_used)]
    fn message_count(&self, room_id: &RoomId) -> Result<usize, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.rooms.get(room_id).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::new(id)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn test_new_storage_is_empty() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.room_count(), 0);
        assert_eq!(storage.total_message_count(), 0);
        assert!(storage.history(&room("g1")).unwrap().is_empty());
    }

    #[test]
    fn test_append_and_history() {
        let storage = MemoryStorage::new();

        let first = storage.append(&room("g1"), &user("u1"), "hello", 100).unwrap();
        let second = storage.append(&room("g1"), &user("u2"), "hi", 200).unwrap();

        let history = storage.history(&room("g1")).unwrap();
        assert_eq!(history, vec![first, second]);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].timestamp, 200);
    }

    #[test]
    fn test_rooms_are_isolated() {
        let storage = MemoryStorage::new();

        storage.append(&room("g1"), &user("u1"), "one", 1).unwrap();
        storage.append(&room("g2"), &user("u1"), "two", 2).unwrap();

        assert_eq!(storage.message_count(&room("g1")).unwrap(), 1);
        assert_eq!(storage.message_count(&room("g2")).unwrap(), 1);
        assert_eq!(storage.history(&room("g2")).unwrap()[0].content, "two");
    }

    #[test]
    fn test_content_stored_verbatim() {
        let storage = MemoryStorage::new();
        let stored = storage.append(&room("g1"), &user("u1"), "  padded  ", 1).unwrap();
        assert_eq!(stored.content, "  padded  ");
    }

    #[test]
    fn test_clock_regression_keeps_order() {
        let storage = MemoryStorage::new();

        let late = storage.append(&room("g1"), &user("u1"), "first", 5_000).unwrap();
        let early = storage.append(&room("g1"), &user("u1"), "second", 1_000).unwrap();

        assert_eq!(early.timestamp, 5_000);
        let history = storage.history(&room("g1")).unwrap();
        assert_eq!(history, vec![late, early]);
    }

    #[test]
    fn test_find_and_delete() {
        let storage = MemoryStorage::new();
        let stored = storage.append(&room("g1"), &user("u1"), "bye", 1).unwrap();

        assert_eq!(storage.find_by_id(stored.id).unwrap(), Some(stored.clone()));
        assert_eq!(storage.delete_by_id(stored.id).unwrap(), stored);
        assert_eq!(storage.find_by_id(stored.id).unwrap(), None);
        assert_eq!(storage.room_count(), 0);
    }

    #[test]
    fn test_second_delete_is_not_found() {
        let storage = MemoryStorage::new();
        let stored = storage.append(&room("g1"), &user("u1"), "bye", 1).unwrap();

        storage.delete_by_id(stored.id).unwrap();
        assert_eq!(
            storage.delete_by_id(stored.id),
            Err(StorageError::MessageNotFound(stored.id))
        );
    }

    #[test]
    fn test_clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();

        storage.append(&room("g1"), &user("u1"), "shared", 1).unwrap();
        assert_eq!(clone.message_count(&room("g1")).unwrap(), 1);
    }
}
