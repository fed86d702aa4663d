//! Gateway behavior under injected storage failures.

use studyroom_harness::{ChatHarness, InvariantRegistry};
use studyroom_proto::{ErrorCode, RoomId, ServerEvent};
use studyroom_server::{ChaoticStorage, GatewayConfig, MemoryStorage, MessageStore};

type ChaosHarness = ChatHarness<ChaoticStorage<MemoryStorage>>;

fn harness(failure_rate: f64, seed: u64) -> ChaosHarness {
    let store = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
    ChatHarness::with_store(store, GatewayConfig::default(), seed)
}

#[tokio::test]
async fn failed_append_is_never_broadcast() {
    let mut harness = harness(0.0, 1);
    let a = harness.connect_as("u1").await.unwrap();
    let b = harness.connect_as("u2").await.unwrap();
    harness.join(a, "g1").await.unwrap();
    harness.join(b, "g1").await.unwrap();
    harness.clear_inboxes();

    harness.gateway().store().set_failure_rate(1.0);
    harness.send_message(a, "g1", "lost").await.unwrap();

    let inbox = harness.take_inbox(a);
    assert!(matches!(&inbox[..], [ServerEvent::Error(e)] if e.code == ErrorCode::Persistence));
    assert!(harness.take_inbox(b).is_empty());

    let inner = harness.gateway().store().inner();
    assert_eq!(inner.message_count(&RoomId::new("g1")).unwrap(), 0);
}

#[tokio::test]
async fn failed_history_read_rolls_back_join() {
    let mut harness = harness(0.0, 2);
    let a = harness.connect_as("u1").await.unwrap();
    harness.take_inbox(a);

    harness.gateway().store().set_failure_rate(1.0);
    harness.join(a, "g1").await.unwrap();

    let inbox = harness.take_inbox(a);
    assert!(matches!(&inbox[..], [ServerEvent::Error(e)] if e.code == ErrorCode::Persistence));
    assert!(harness.gateway().members_of(&RoomId::new("g1")).await.is_empty());

    harness.gateway().store().set_failure_rate(0.0);
    let snapshot = harness.snapshot().await.unwrap();
    InvariantRegistry::standard().assert_all(&snapshot, "after failed join");
}

#[tokio::test]
async fn failed_delete_keeps_message() {
    let mut harness = harness(0.0, 3);
    let a = harness.connect_as("u1").await.unwrap();
    harness.join(a, "g1").await.unwrap();
    harness.send_message(a, "g1", "keep me").await.unwrap();
    harness.clear_inboxes();

    let id = harness.gateway().store().inner().history(&RoomId::new("g1")).unwrap()[0].id;
    harness.gateway().store().set_failure_rate(1.0);
    harness.delete_message(a, id).await.unwrap();

    let inbox = harness.take_inbox(a);
    assert!(matches!(&inbox[..], [ServerEvent::Error(e)] if e.code == ErrorCode::Persistence));
    assert!(harness.gateway().store().inner().find_by_id(id).unwrap().is_some());
}

#[tokio::test]
async fn random_failures_preserve_invariants() {
    for seed in 0..8 {
        let mut harness = harness(0.3, seed);
        let sessions = [
            harness.connect_as("u1").await.unwrap(),
            harness.connect_as("u2").await.unwrap(),
            harness.connect_as("u3").await.unwrap(),
        ];

        for step in 0..60u64 {
            let session = sessions[(step % 3) as usize];
            let room = format!("g{}", step % 2);
            match step % 5 {
                0 | 3 => harness.join(session, &room).await.unwrap(),
                4 => harness.leave(session, &room).await.unwrap(),
                _ => harness.send_message(session, &room, &format!("s{step}")).await.unwrap(),
            }
        }

        // Every broadcast message must have been persisted.
        for session in sessions {
            for event in harness.take_inbox(session) {
                if let ServerEvent::Message(m) = event {
                    let stored = harness.gateway().store().inner().find_by_id(m.id).unwrap();
                    assert_eq!(stored, Some(m), "seed {seed}");
                }
            }
        }

        harness.gateway().store().set_failure_rate(0.0);
        let snapshot = harness.snapshot().await.unwrap();
        InvariantRegistry::standard().assert_all(&snapshot, &format!("seed {seed}"));
        assert!(harness.gateway().store().operation_count() > 0);
    }
}
