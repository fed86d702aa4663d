//! Fuzz target for session records and the room index together
//!
//! Drives several `ConnectionSession`s and one `RoomRegistry` the way the
//! gateway does, with arbitrary interleavings.
//!
//! # Invariants
//!
//! - Identity never changes once bound
//! - Unauthenticated or closed sessions never gain rooms
//! - The registry holds `(room, session)` exactly when the session's joined
//!   set holds `room`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use studyroom_core::ConnectionSession;
use studyroom_proto::{RoomId, UserId};
use studyroom_server::RoomRegistry;

const SESSIONS: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Authenticate { session: u8, user: u8 },
    Join { session: u8, room: u8 },
    Leave { session: u8, room: u8 },
    Close { session: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let mut sessions: Vec<ConnectionSession> =
        (0..SESSIONS as u64).map(ConnectionSession::new).collect();
    let mut registry = RoomRegistry::new();

    for op in ops {
        match op {
            Op::Authenticate { session, user } => {
                let s = &mut sessions[usize::from(session) % SESSIONS];
                let before = s.user_id().cloned();
                let result = s.authenticate(UserId::new(format!("u{user}")));
                if before.is_some() {
                    assert!(result.is_err());
                    assert_eq!(s.user_id(), before.as_ref());
                }
            },
            Op::Join { session, room } => {
                let idx = usize::from(session) % SESSIONS;
                let room_id = RoomId::new(format!("g{}", room % 8));
                let s = &mut sessions[idx];
                if s.join(room_id.clone()).is_ok() {
                    registry.join(&room_id, idx as u64);
                } else {
                    assert!(s.user_id().is_none());
                }
            },
            Op::Leave { session, room } => {
                let idx = usize::from(session) % SESSIONS;
                let room_id = RoomId::new(format!("g{}", room % 8));
                if sessions[idx].leave(&room_id).is_ok() {
                    registry.leave(&room_id, idx as u64);
                }
            },
            Op::Close { session } => {
                let idx = usize::from(session) % SESSIONS;
                let joined = sessions[idx].close();
                let left = registry.leave_all(idx as u64);
                assert_eq!(joined.len(), left.len());
            },
        }

        for (idx, session) in sessions.iter().enumerate() {
            let from_session: Vec<_> = session.joined_rooms().cloned().collect();
            let mut from_registry: Vec<_> = registry.rooms_of(idx as u64).cloned().collect();
            from_registry.sort();
            assert_eq!(from_session, from_registry);
            if !session.is_live() {
                assert!(from_session.is_empty());
            }
        }
    }
});
