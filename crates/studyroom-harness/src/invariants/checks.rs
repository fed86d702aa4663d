//! Standard invariant checks.

use std::collections::HashSet;

use studyroom_core::SessionState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// The room index and the session records describe the same memberships.
///
/// A session is in a room's member set exactly when the room is in that
/// session's joined set. Divergence means a join, leave, or disconnect
/// updated one side only.
pub struct RoomIndexConsistency;

impl Invariant for RoomIndexConsistency {
    fn name(&self) -> &'static str {
        "room_index_consistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let from_sessions = state.session_memberships();

        if let Some((room, session)) = state.memberships.difference(&from_sessions).next() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("registry has session {session} in {room}, session does not"),
            });
        }

        if let Some((room, session)) = from_sessions.difference(&state.memberships).next() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("session {session} joined {room}, registry does not have it"),
            });
        }

        Ok(())
    }
}

/// Only live, authenticated sessions hold room memberships.
pub struct MembersAuthenticated;

impl Invariant for MembersAuthenticated {
    fn name(&self) -> &'static str {
        "members_authenticated"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (room, session_id) in &state.memberships {
            match state.session(*session_id).map(|s| &s.state) {
                Some(SessionState::Authenticated { .. }) => {},
                Some(other) => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("session {session_id} in {room} while {other:?}"),
                    });
                },
                None => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("room {room} lists departed session {session_id}"),
                    });
                },
            }
        }
        Ok(())
    }
}

/// Stored history is in ascending `(timestamp, id)` order with unique ids,
/// and every record belongs to the room it was listed under.
pub struct HistoryOrdered;

impl Invariant for HistoryOrdered {
    fn name(&self) -> &'static str {
        "history_ordered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();

        for (room, history) in &state.histories {
            for message in history {
                if &message.room_id != room {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "message {} of {} listed under {room}",
                            message.id, message.room_id
                        ),
                    });
                }
                if !seen.insert(message.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("message id {} appears twice", message.id),
                    });
                }
            }

            for pair in history.windows(2) {
                if pair[0].order_key() >= pair[1].order_key() {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "room {room}: {} (t={}) precedes {} (t={})",
                            pair[0].id, pair[0].timestamp, pair[1].id, pair[1].timestamp
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};

    use super::*;
    use crate::invariants::SessionSnapshot;

    fn authenticated(session_id: u64, rooms: &[&str]) -> SessionSnapshot {
        SessionSnapshot {
            session_id,
            state: SessionState::Authenticated { user_id: UserId::new("u") },
            joined: rooms.iter().map(|r| RoomId::new(*r)).collect(),
        }
    }

    fn message(room: &str, timestamp: u64, seq: u64) -> ChatMessage {
        ChatMessage {
            id: MessageId::from_parts(timestamp, seq),
            room_id: RoomId::new(room),
            sender: UserId::new("u"),
            content: "hi".to_string(),
            timestamp,
        }
    }

    #[test]
    fn consistent_index_passes() {
        let state = SystemSnapshot {
            sessions: vec![authenticated(1, &["g1"])],
            memberships: BTreeSet::from([(RoomId::new("g1"), 1)]),
            ..Default::default()
        };
        assert!(RoomIndexConsistency.check(&state).is_ok());
        assert!(MembersAuthenticated.check(&state).is_ok());
    }

    #[test]
    fn stale_registry_entry_is_caught() {
        let state = SystemSnapshot {
            sessions: vec![authenticated(1, &[])],
            memberships: BTreeSet::from([(RoomId::new("g1"), 1)]),
            ..Default::default()
        };
        assert!(RoomIndexConsistency.check(&state).is_err());
    }

    #[test]
    fn departed_member_is_caught() {
        let state = SystemSnapshot {
            memberships: BTreeSet::from([(RoomId::new("g1"), 9)]),
            ..Default::default()
        };
        assert!(MembersAuthenticated.check(&state).is_err());
    }

    #[test]
    fn out_of_order_history_is_caught() {
        let mut state = SystemSnapshot::default();
        state
            .histories
            .insert(RoomId::new("g1"), vec![message("g1", 20, 1), message("g1", 10, 0)]);
        assert!(HistoryOrdered.check(&state).is_err());

        state
            .histories
            .insert(RoomId::new("g1"), vec![message("g1", 10, 0), message("g1", 20, 1)]);
        assert!(HistoryOrdered.check(&state).is_ok());
    }
}
