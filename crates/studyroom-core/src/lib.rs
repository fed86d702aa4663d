//! Study-room chat core.
//!
//! Pure logic shared by the server runtime and the test harness:
//!
//! - [`env`]: time and randomness behind a trait, so tests run on a virtual
//!   clock with seeded RNG.
//! - [`session`]: the per-connection state machine (unauthenticated →
//!   authenticated → closed) and its joined-room set.
//! - [`otp`]: expiring one-time codes with lazy expiry on read.
//!
//! Nothing here performs I/O. Callers pass the current time in, and methods
//! return results the caller acts on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod otp;
pub mod session;

pub use env::Environment;
pub use error::{OtpError, SessionError};
pub use otp::OtpStore;
pub use session::{ConnectionSession, SessionState};
