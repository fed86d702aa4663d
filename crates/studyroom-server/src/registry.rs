//! Room registry for broadcast membership.
//!
//! The registry maintains bidirectional mappings: room → sessions (for
//! broadcast) and session → rooms (for cleanup on disconnect). Both directions
//! are O(1) lookups, and `leave_all` touches only the rooms the session held.
//!
//! Rooms have no existence of their own: a room appears on first join and is
//! removed when its last member leaves. Nothing here is persisted.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use studyroom_proto::RoomId;
use tokio::sync::RwLock;

/// Registry shared between the gateway (writes) and the dispatcher (reads).
pub type SharedRooms = Arc<RwLock<RoomRegistry>>;

/// Registry for tracking which sessions are joined to which rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Room ID → set of joined session IDs
    members: HashMap<RoomId, HashSet<u64>>,
    /// Session ID → set of joined room IDs
    session_rooms: HashMap<u64, HashSet<RoomId>>,
}

impl RoomRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind a shared lock.
    pub fn shared() -> SharedRooms {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Add a session to a room.
    ///
    /// Idempotent. Returns `true` if the session was not already a member.
    pub fn join(&mut self, room_id: &RoomId, session_id: u64) -> bool {
        let added = self.members.entry(room_id.clone()).or_default().insert(session_id);
        self.session_rooms.entry(session_id).or_default().insert(room_id.clone());

        debug_assert!(self.is_member(room_id, session_id));
        added
    }

    /// Remove a session from a room.
    ///
    /// Leaving a room the session is not in is a no-op. Returns `true` if the
    /// session was a member.
    pub fn leave(&mut self, room_id: &RoomId, session_id: u64) -> bool {
        let removed_from_room =
            self.members.get_mut(room_id).is_some_and(|s| s.remove(&session_id));

        let removed_from_session =
            self.session_rooms.get_mut(&session_id).is_some_and(|r| r.remove(room_id));

        if self.members.get(room_id).is_some_and(HashSet::is_empty) {
            self.members.remove(room_id);
        }
        if self.session_rooms.get(&session_id).is_some_and(HashSet::is_empty) {
            self.session_rooms.remove(&session_id);
        }

        debug_assert_eq!(removed_from_room, removed_from_session);
        removed_from_room
    }

    /// Remove a session from every room it joined.
    ///
    /// Returns the rooms it left.
    pub fn leave_all(&mut self, session_id: u64) -> HashSet<RoomId> {
        let rooms = self.session_rooms.remove(&session_id).unwrap_or_default();

        for room_id in &rooms {
            if let Some(members) = self.members.get_mut(room_id) {
                members.remove(&session_id);
                if members.is_empty() {
                    self.members.remove(room_id);
                }
            }
        }

        rooms
    }

    /// Snapshot of the sessions currently joined to a room.
    pub fn members_of(&self, room_id: &RoomId) -> Vec<u64> {
        self.members.get(room_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Check if a session is joined to a room.
    pub fn is_member(&self, room_id: &RoomId, session_id: u64) -> bool {
        self.members.get(room_id).is_some_and(|s| s.contains(&session_id))
    }

    /// All rooms a session is joined to.
    pub fn rooms_of(&self, session_id: u64) -> impl Iterator<Item = &RoomId> + '_ {
        self.session_rooms.get(&session_id).into_iter().flat_map(|r| r.iter())
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// Number of sessions joined to a room.
    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.members.get(room_id).map_or(0, HashSet::len)
    }

    /// Every (room, session) pair, seen from the room side.
    pub fn memberships(&self) -> impl Iterator<Item = (&RoomId, u64)> + '_ {
        self.members.iter().flat_map(|(room, sessions)| sessions.iter().map(move |s| (room, *s)))
    }

    /// Number of sessions joined to at least one room.
    pub fn session_count(&self) -> usize {
        self.session_rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::new(id)
    }

    #[test]
    fn join_and_lookup() {
        let mut registry = RoomRegistry::new();

        assert!(registry.join(&room("g1"), 1));
        assert!(registry.join(&room("g1"), 2));

        assert!(registry.is_member(&room("g1"), 1));
        assert!(registry.is_member(&room("g1"), 2));

        let mut members = registry.members_of(&room("g1"));
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn join_is_idempotent() {
        let mut registry = RoomRegistry::new();

        assert!(registry.join(&room("g1"), 1));
        assert!(!registry.join(&room("g1"), 1));
        assert_eq!(registry.member_count(&room("g1")), 1);
    }

    #[test]
    fn leave_removes_from_both_maps() {
        let mut registry = RoomRegistry::new();

        registry.join(&room("g1"), 1);

        assert!(registry.leave(&room("g1"), 1));
        assert!(!registry.is_member(&room("g1"), 1));
        assert!(registry.members_of(&room("g1")).is_empty());
        assert_eq!(registry.rooms_of(1).count(), 0);
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn leave_of_non_member_is_noop() {
        let mut registry = RoomRegistry::new();

        registry.join(&room("g1"), 1);

        assert!(!registry.leave(&room("g1"), 2));
        assert!(!registry.leave(&room("g2"), 1));
        assert_eq!(registry.member_count(&room("g1")), 1);
    }

    #[test]
    fn leave_all_removes_every_membership() {
        let mut registry = RoomRegistry::new();

        registry.join(&room("g1"), 1);
        registry.join(&room("g2"), 1);
        registry.join(&room("g1"), 2);

        let rooms = registry.leave_all(1);
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&room("g1")));
        assert!(rooms.contains(&room("g2")));

        assert_eq!(registry.members_of(&room("g1")), vec![2]);

        // g2 had no other members and is gone
        assert_eq!(registry.member_count(&room("g2")), 0);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn leave_all_unknown_session_is_empty() {
        let mut registry = RoomRegistry::new();
        assert!(registry.leave_all(42).is_empty());
    }

    #[test]
    fn rooms_of_session() {
        let mut registry = RoomRegistry::new();

        registry.join(&room("g1"), 1);
        registry.join(&room("g2"), 1);

        let rooms: HashSet<_> = registry.rooms_of(1).cloned().collect();
        assert_eq!(rooms, HashSet::from([room("g1"), room("g2")]));
    }
}
