//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live state so each check sees
//! one consistent view.

use std::collections::{BTreeMap, BTreeSet};

use studyroom_core::SessionState;
use studyroom_proto::{ChatMessage, RoomId};

/// Snapshot of the gateway, room index, and store.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Live session records, ordered by session id.
    pub sessions: Vec<SessionSnapshot>,
    /// Room index entries as `(room, session)`.
    pub memberships: BTreeSet<(RoomId, u64)>,
    /// Stored history for every room the run sent messages to.
    pub histories: BTreeMap<RoomId, Vec<ChatMessage>>,
}

impl SystemSnapshot {
    /// `(room, session)` pairs implied by session records.
    pub fn session_memberships(&self) -> BTreeSet<(RoomId, u64)> {
        self.sessions
            .iter()
            .flat_map(|s| s.joined.iter().map(move |room| (room.clone(), s.session_id)))
            .collect()
    }

    /// Session record by id.
    pub fn session(&self, session_id: u64) -> Option<&SessionSnapshot> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }
}

/// Snapshot of one session record.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session id.
    pub session_id: u64,
    /// Authentication state.
    pub state: SessionState,
    /// Joined rooms.
    pub joined: BTreeSet<RoomId>,
}
