//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling.
//! Used for chaos testing to ensure a failed append never reaches a
//! broadcast and a failed history read never leaves a half-joined session.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};

use super::{MessageStore, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations based on a
/// configured failure rate. The rate can be changed at runtime so a test can
/// set up state cleanly and then turn chaos on. Clones share the RNG and the
/// rate.
#[derive(Clone)]
pub struct ChaoticStorage<S: MessageStore> {
    inner: S,
    chaos: Arc<Mutex<ChaosState>>,
    /// Operation counter for performance testing
    operation_count: Arc<Mutex<usize>>,
}

struct ChaosState {
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: ChaoticRng,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos runs are reproducible from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: MessageStore> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert_rate(failure_rate);

        Self {
            inner,
            chaos: Arc::new(Mutex::new(ChaosState { failure_rate, rng: ChaoticRng::new(seed) })),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Change the failure rate for subsequent operations.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn set_failure_rate(&self, failure_rate: f64) {
        assert_rate(failure_rate);

        #[allow(clippy::expect_used)]
        let mut chaos = self.chaos.lock().expect("ChaosState mutex poisoned");
        chaos.failure_rate = failure_rate;
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    fn increment_operation_count(&self) {
        #[allow(clippy::expect_used)]
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
    }

    /// Count the operation and decide whether it fails.
    fn check(&self) -> Result<(), StorageError> {
        self.increment_operation_count();

        #[allow(clippy::expect_used)]
        let mut chaos = self.chaos.lock().expect("ChaosState mutex poisoned");
        let failure_rate = chaos.failure_rate;
        if chaos.rng.next() < failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

fn assert_rate(failure_rate: f64) {
    assert!(
        (0.0..=1.0).contains(&failure_rate),
        "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
    );
}

impl<S: MessageStore> MessageStore for ChaoticStorage<S> {
    fn append(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
        now_millis: u64,
    ) -> Result<ChatMessage, StorageError> {
        self.check()?;
        self.inner.append(room_id, sender, content, now_millis)
    }

    fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, StorageError> {
        self.check()?;
        self.inner.history(room_id)
    }

    fn find_by_id(&self, message_id: MessageId) -> Result<Option<ChatMessage>, StorageError> {
        self.check()?;
        self.inner.find_by_id(message_id)
    }

    fn delete_by_id(&self, message_id: MessageId) -> Result<ChatMessage, StorageError> {
        self.check()?;
        self.inner.delete_by_id(message_id)
    }

    fn message_count(&self, room_id: &RoomId) -> Result<usize, StorageError> {
        self.check()?;
        self.inner.message_count(room_id)
    }
}
