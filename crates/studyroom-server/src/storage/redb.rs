//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Messages, the id index, and the id allocator all survive restarts; the
//! allocator is updated in the same transaction as the message it numbered.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};

use super::{IdAllocator, MessageStore, StorageError};

/// Table: messages
/// Key: [room_len: u32 BE][room_id bytes][message_id: 16 bytes BE]
/// Value: CBOR-encoded ChatMessage
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Table: message_rooms
/// Key: message_id as u128
/// Value: owning room id
const MESSAGE_ROOMS: TableDefinition<u128, &str> = TableDefinition::new("message_rooms");

/// Table: meta
/// Key: counter name
/// Value: counter value
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LAST_TIMESTAMP: &str = "last_timestamp";
const NEXT_SEQUENCE: &str = "next_sequence";

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (MESSAGES, MESSAGE_ROOMS, META).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(MESSAGE_ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(META).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Total number of stored messages across all rooms.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the read transaction fails.
    pub fn total_message_count(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGE_ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
        table.len().map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl MessageStore for RedbStorage {
    fn append(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
        now_millis: u64,
    ) -> Result<ChatMessage, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let message = {
            let mut meta = txn.open_table(META).map_err(|e| StorageError::Io(e.to_string()))?;

            let last_timestamp = read_counter(&meta, LAST_TIMESTAMP)?;
            let next_sequence = read_counter(&meta, NEXT_SEQUENCE)?;
            let mut ids = IdAllocator::from_parts(last_timestamp, next_sequence);

            let (timestamp, id) = ids.allocate(now_millis);
            let message = ChatMessage {
                id,
                room_id: room_id.clone(),
                sender: sender.clone(),
                content: content.to_string(),
                timestamp,
            };

            let mut value = Vec::new();
            ciborium::into_writer(&message, &mut value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let mut messages =
                txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_message_key(room_id, id);
            messages
                .insert(key.as_slice(), value.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            let mut index =
                txn.open_table(MESSAGE_ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
            index
                .insert(id.as_u128(), room_id.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            meta.insert(LAST_TIMESTAMP, ids.last_timestamp())
                .map_err(|e| StorageError::Io(e.to_string()))?;
            meta.insert(NEXT_SEQUENCE, ids.next_sequence())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            message
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(message)
    }

    fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;

        let start_key = encode_message_key(room_id, MessageId::from_u128(0));
        let end_key = encode_message_key(room_id, MessageId::from_u128(u128::MAX));

        let results = table
            .range(start_key.as_slice()..=end_key.as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut history = Vec::new();
        for result in results {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            history.push(decode_message(value.value())?);
        }

        Ok(history)
    }

    fn find_by_id(&self, message_id: MessageId) -> Result<Option<ChatMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let index = txn.open_table(MESSAGE_ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;

        let room_id = match index
            .get(message_id.as_u128())
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            Some(room) => RoomId::new(room.value()),
            None => return Ok(None),
        };

        let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
        let key = encode_message_key(&room_id, message_id);

        match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_message(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_by_id(&self, message_id: MessageId) -> Result<ChatMessage, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let removed = {
            let mut index =
                txn.open_table(MESSAGE_ROOMS).map_err(|e| StorageError::Io(e.to_string()))?;
            let room_id = index
                .remove(message_id.as_u128())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .map(|room| RoomId::new(room.value()))
                .ok_or(StorageError::MessageNotFound(message_id))?;

            let mut table =
                txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
            let key = encode_message_key(&room_id, message_id);
            let bytes = table
                .remove(key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .map(|value| value.value().to_vec())
                .ok_or(StorageError::MessageNotFound(message_id))?;

            decode_message(&bytes)?
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(removed)
    }

    fn message_count(&self, room_id: &RoomId) -> Result<usize, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;

        let start_key = encode_message_key(room_id, MessageId::from_u128(0));
        let end_key = encode_message_key(room_id, MessageId::from_u128(u128::MAX));

        let results = table
            .range(start_key.as_slice()..=end_key.as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut count = 0;
        for result in results {
            result.map_err(|e| StorageError::Io(e.to_string()))?;
            count += 1;
        }

        Ok(count)
    }
}

fn read_counter<T: ReadableTable<&'static str, u64>>(
    table: &T,
    name: &str,
) -> Result<u64, StorageError> {
    Ok(table
        .get(name)
        .map_err(|e| StorageError::Io(e.to_string()))?
        .map_or(0, |value| value.value()))
}

fn decode_message(bytes: &[u8]) -> Result<ChatMessage, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode (room_id, message_id) as a length-prefixed key.
///
/// Layout: [room_len: u32 BE][room_id bytes][message_id: 16 bytes BE]
/// The length prefix keeps one room's keys contiguous (no room id is a prefix
/// of another's key range), and the big-endian id makes lexicographic order
/// match id order within a room.
fn encode_message_key(room_id: &RoomId, message_id: MessageId) -> Vec<u8> {
    let room = room_id.as_str().as_bytes();
    let room_len = u32::try_from(room.len()).unwrap_or(u32::MAX);

    let mut key = Vec::with_capacity(4 + room.len() + 16);
    key.extend_from_slice(&room_len.to_be_bytes());
    key.extend_from_slice(room);
    key.extend_from_slice(&message_id.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::new(id)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn test_message_key_layout() {
        let id = MessageId::from_parts(7, 9);
        let key = encode_message_key(&room("ab"), id);

        assert_eq!(key.len(), 4 + 2 + 16);
        assert_eq!(&key[..4], &2u32.to_be_bytes());
        assert_eq!(&key[4..6], b"ab");
        assert_eq!(&key[6..], &id.to_be_bytes());
    }

    #[test]
    fn test_key_order_matches_id_order() {
        let a = encode_message_key(&room("g1"), MessageId::from_parts(1, 5));
        let b = encode_message_key(&room("g1"), MessageId::from_parts(2, 0));
        assert!(a < b);
    }

    #[test]
    fn test_append_and_history() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let first = storage.append(&room("g1"), &user("u1"), "hello", 100).unwrap();
        let second = storage.append(&room("g1"), &user("u2"), "hi", 200).unwrap();
        storage.append(&room("g10"), &user("u1"), "elsewhere", 300).unwrap();

        assert_eq!(storage.history(&room("g1")).unwrap(), vec![first, second]);
        assert_eq!(storage.message_count(&room("g10")).unwrap(), 1);
        assert_eq!(storage.total_message_count().unwrap(), 3);
    }

    #[test]
    fn test_history_unknown_room_is_empty() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        assert!(storage.history(&room("nobody")).unwrap().is_empty());
    }

    #[test]
    fn test_find_and_delete() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let stored = storage.append(&room("g1"), &user("u1"), "bye", 1).unwrap();

        assert_eq!(storage.find_by_id(stored.id).unwrap(), Some(stored.clone()));
        assert_eq!(storage.delete_by_id(stored.id).unwrap(), stored);
        assert_eq!(storage.find_by_id(stored.id).unwrap(), None);
        assert_eq!(
            storage.delete_by_id(stored.id),
            Err(StorageError::MessageNotFound(stored.id))
        );
        assert!(storage.history(&room("g1")).unwrap().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        let before = {
            let storage = RedbStorage::open(&path).unwrap();
            storage.append(&room("g1"), &user("u1"), "persisted", 10_000).unwrap()
        };

        let storage = RedbStorage::open(&path).unwrap();
        assert_eq!(storage.history(&room("g1")).unwrap(), vec![before.clone()]);

        // Allocator state is durable: a regressed clock after restart still
        // yields a later id and a clamped timestamp.
        let after = storage.append(&room("g1"), &user("u1"), "later", 5_000).unwrap();
        assert!(after.id > before.id);
        assert_eq!(after.timestamp, 10_000);
    }
}
