//! OTP store behavior on the simulated clock.

use std::time::Duration;

use proptest::prelude::*;
use studyroom_core::{Environment, OtpError, OtpStore};
use studyroom_harness::SimEnv;

#[test]
fn issued_code_verifies_once_before_deadline() {
    let env = SimEnv::with_seed(5);
    let mut store = OtpStore::new(Duration::from_secs(600));

    let code = store.issue("student@example.com", &env);
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_digit()));

    env.advance(Duration::from_secs(599));
    assert_eq!(store.verify("student@example.com", &code, env.now()), Ok(()));
    assert_eq!(store.verify("student@example.com", &code, env.now()), Err(OtpError::NotFound));
}

#[test]
fn reissue_replaces_pending_code() {
    let env = SimEnv::with_seed(9);
    let mut store = OtpStore::default();

    let first = store.issue("a@example.com", &env);
    let mut second = store.issue("a@example.com", &env);
    while second == first {
        second = store.issue("a@example.com", &env);
    }

    assert_eq!(store.len(), 1);
    assert_eq!(store.verify("a@example.com", &first, env.now()), Err(OtpError::Mismatch));
    assert_eq!(store.verify("a@example.com", &second, env.now()), Ok(()));
}

#[test]
fn sweep_runs_on_virtual_time() {
    let env = SimEnv::new();
    let mut store = OtpStore::new(Duration::from_secs(60));
    store.issue("a@example.com", &env);
    env.advance(Duration::from_secs(30));
    store.issue("b@example.com", &env);

    env.advance(Duration::from_secs(30));
    assert_eq!(store.sweep(env.now()), 1);
    env.advance(Duration::from_secs(30));
    assert_eq!(store.sweep(env.now()), 1);
    assert!(store.is_empty());
}

proptest! {
    #[test]
    fn code_valid_exactly_until_ttl(ttl_secs in 1..3_600u64, wait_secs in 0..7_200u64, seed: u64) {
        let env = SimEnv::with_seed(seed);
        let mut store = OtpStore::new(Duration::from_secs(ttl_secs));
        let code = store.issue("x@example.com", &env);

        env.advance(Duration::from_secs(wait_secs));
        let result = store.verify("x@example.com", &code, env.now());

        if wait_secs < ttl_secs {
            prop_assert_eq!(result, Ok(()));
        } else {
            prop_assert_eq!(result, Err(OtpError::Expired));
        }
        prop_assert!(store.is_empty());
    }
}
