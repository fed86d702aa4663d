//! Deterministic simulation harness for study-room chat testing.
//!
//! In-process implementations of the runtime pieces so gateway behavior can
//! be exercised without sockets, real clocks, or signing keys:
//!
//! - [`SimEnv`]: manual clock, settable wall clock, seeded RNG
//! - [`StaticTokenVerifier`]: fixed token → identity table
//! - [`ChatHarness`]: gateway plus a real dispatcher, with one decoded inbox
//!   per simulated connection
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of room
//! membership and delivery. Operations are applied to both the model and the
//! harness, and the events each connection observed are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of a [`SystemSnapshot`] taken
//! from the harness. Use [`InvariantRegistry::standard()`] for the room index
//! and history invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat_harness;
pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod static_verifier;

pub use chat_harness::{ChatHarness, HarnessGateway};
pub use invariants::{
    HistoryOrdered, Invariant, InvariantRegistry, InvariantResult, MembersAuthenticated,
    RoomIndexConsistency, SessionSnapshot, SystemSnapshot, Violation,
};
pub use model::{ClientId, ModelRoomId, ModelWorld, Observed, Operation, OperationResult};
pub use sim_env::SimEnv;
pub use static_verifier::StaticTokenVerifier;
