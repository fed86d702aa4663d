//! Fuzz target for message stores under injected failures
//!
//! Runs arbitrary append/delete/read sequences against `ChaoticStorage`
//! over `MemoryStorage` and checks the inner store against a plain model.
//!
//! # Invariants
//!
//! - Storage errors come back as `Err`, never panics
//! - A failed append persists nothing; a failed delete removes nothing
//! - History is ascending and matches the model exactly

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use studyroom_proto::{ChatMessage, RoomId, UserId};
use studyroom_server::{ChaoticStorage, MemoryStorage, MessageStore};

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for ChaoticStorage RNG (deterministic failures)
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum ChaosOperation {
    Append { room: u8, clock: u32 },
    Delete { pick: u8 },
    History { room: u8 },
}

fuzz_target!(|scenario: ChaosScenario| {
    let rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let store = ChaoticStorage::with_seed(MemoryStorage::new(), rate, scenario.chaos_seed);
    let mut live: Vec<ChatMessage> = Vec::new();

    for op in scenario.operations {
        match op {
            ChaosOperation::Append { room, clock } => {
                let room_id = RoomId::new(format!("g{}", room % 4));
                if let Ok(message) =
                    store.append(&room_id, &UserId::new("u"), "x", u64::from(clock))
                {
                    live.push(message);
                }
            },
            ChaosOperation::Delete { pick } => {
                if live.is_empty() {
                    continue;
                }
                let idx = usize::from(pick) % live.len();
                if store.delete_by_id(live[idx].id).is_ok() {
                    live.remove(idx);
                }
            },
            ChaosOperation::History { room } => {
                let room_id = RoomId::new(format!("g{}", room % 4));
                if let Ok(history) = store.history(&room_id) {
                    assert!(history.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
                }
            },
        }
    }

    for room in 0..4u8 {
        let room_id = RoomId::new(format!("g{room}"));
        let stored = store.inner().history(&room_id).expect("memory store does not fail");
        let expected: Vec<_> = live.iter().filter(|m| m.room_id == room_id).cloned().collect();
        assert_eq!(stored, expected);
    }
});
