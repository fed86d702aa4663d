//! Simulated environment.
//!
//! Time only moves when a test calls [`SimEnv::advance`], and randomness
//! comes from a seeded ChaCha RNG, so every run with the same seed produces
//! the same codes and timestamps.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use studyroom_core::Environment;

/// Wall clock at construction: 2024-01-01T00:00:00Z.
pub const DEFAULT_WALL_CLOCK_MILLIS: u64 = 1_704_067_200_000;

/// Virtual monotonic instant: time since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since the simulation started.
    pub fn elapsed_since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug)]
struct SimState {
    elapsed: Duration,
    wall_clock_millis: u64,
    rng: ChaCha8Rng,
}

/// Deterministic environment for tests.
///
/// Clones share one clock and one RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Create an environment seeded with zero.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an environment with a specific RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                wall_clock_millis: DEFAULT_WALL_CLOCK_MILLIS,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.wall_clock_millis =
            state.wall_clock_millis.saturating_add(duration.as_millis() as u64);
    }

    /// Set the wall clock, e.g. to simulate an NTP step backwards.
    ///
    /// The monotonic clock is unaffected.
    pub fn set_wall_clock_millis(&self, millis: u64) {
        self.lock().wall_clock_millis = millis;
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("invariant: SimEnv mutex is never poisoned")
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.lock().elapsed)
    }

    fn wall_clock_millis(&self) -> u64 {
        self.lock().wall_clock_millis
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
