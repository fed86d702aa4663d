//! Expiring one-time codes.
//!
//! Codes used to verify email ownership during registration and password
//! reset. Each entry carries its own deadline, checked on read, plus an
//! explicit [`OtpStore::sweep`] the runtime may call periodically. There are
//! no timers: time is passed in, so tests never wait on a real clock.
//!
//! Generic over `I` (Instant type) to support virtual time in tests.

use std::{collections::HashMap, ops::Add, time::Duration};

use crate::{env::Environment, error::OtpError};

/// Lifetime of an issued code.
pub const DEFAULT_OTP_TTL: Duration = Duration::from_secs(10 * 60);

/// Number of decimal digits in a code.
pub const OTP_DIGITS: u32 = 6;

#[derive(Debug, Clone)]
struct OtpEntry<I> {
    code: String,
    expires_at: I,
}

/// Pending codes keyed by email address.
#[derive(Debug, Clone)]
pub struct OtpStore<I> {
    entries: HashMap<String, OtpEntry<I>>,
    ttl: Duration,
}

impl<I> OtpStore<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create a store with the given code lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    /// Generate a fresh code for `email`, replacing any pending one.
    pub fn issue<E>(&mut self, email: &str, env: &E) -> String
    where
        E: Environment<Instant = I>,
    {
        let modulus = 10u64.pow(OTP_DIGITS);
        let code = format!("{:0width$}", env.random_u64() % modulus, width = OTP_DIGITS as usize);
        self.insert(email, code.clone(), env.now());
        code
    }

    /// Record `code` for `email`, valid until `now + ttl`.
    pub fn insert(&mut self, email: &str, code: String, now: I) {
        let entry = OtpEntry { code, expires_at: now + self.ttl };
        self.entries.insert(normalize(email), entry);
    }

    /// Check a code. A matching code is consumed.
    ///
    /// # Errors
    ///
    /// - `OtpError::NotFound` if nothing is pending for `email`
    /// - `OtpError::Expired` if the deadline passed (the entry is dropped)
    /// - `OtpError::Mismatch` if the code differs (the entry is kept)
    pub fn verify(&mut self, email: &str, code: &str, now: I) -> Result<(), OtpError> {
        let key = normalize(email);
        let entry = self.entries.get(&key).ok_or(OtpError::NotFound)?;

        if now >= entry.expires_at {
            self.entries.remove(&key);
            return Err(OtpError::Expired);
        }

        if entry.code != code {
            return Err(OtpError::Mismatch);
        }

        self.entries.remove(&key);
        Ok(())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&mut self, now: I) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    /// Number of pending entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I> Default for OtpStore<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new(DEFAULT_OTP_TTL)
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
