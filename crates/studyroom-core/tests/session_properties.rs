//! Property tests for the connection session state machine.

use std::collections::BTreeSet;

use proptest::{collection::vec, prelude::*};
use studyroom_core::{ConnectionSession, SessionError, SessionState};
use studyroom_proto::{RoomId, UserId};

#[derive(Debug, Clone)]
enum Step {
    Authenticate(u8),
    Join(u8),
    Leave(u8),
    Close,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => (0..3u8).prop_map(Step::Authenticate),
        4 => (0..4u8).prop_map(Step::Join),
        2 => (0..4u8).prop_map(Step::Leave),
        1 => Just(Step::Close),
    ]
}

fn room(r: u8) -> RoomId {
    RoomId::new(format!("g{r}"))
}

proptest! {
    #[test]
    fn session_follows_state_machine(steps in vec(step(), 0..50)) {
        let mut session = ConnectionSession::new(1);
        let mut identity: Option<UserId> = None;
        let mut closed = false;
        let mut joined: BTreeSet<RoomId> = BTreeSet::new();

        for step in steps {
            match step {
                Step::Authenticate(u) => {
                    let user = UserId::new(format!("u{u}"));
                    let result = session.authenticate(user.clone());
                    match (&identity, closed) {
                        (_, true) => {
                            prop_assert!(matches!(result, Err(SessionError::Closed { .. })), "expected Closed, got {:?}", result);
                        },
                        (Some(existing), false) => prop_assert_eq!(
                            result,
                            Err(SessionError::AlreadyAuthenticated { user_id: existing.clone() })
                        ),
                        (None, false) => {
                            prop_assert!(result.is_ok());
                            identity = Some(user);
                        },
                    }
                },
                Step::Join(r) => {
                    let result = session.join(room(r));
                    if identity.is_some() && !closed {
                        prop_assert_eq!(result, Ok(joined.insert(room(r))));
                    } else {
                        prop_assert!(result.is_err());
                    }
                },
                Step::Leave(r) => {
                    let result = session.leave(&room(r));
                    if identity.is_some() && !closed {
                        prop_assert_eq!(result, Ok(joined.remove(&room(r))));
                    } else {
                        prop_assert!(result.is_err());
                    }
                },
                Step::Close => {
                    let drained = session.close();
                    prop_assert_eq!(drained, std::mem::take(&mut joined));
                    closed = true;
                },
            }

            // Identity, once set, never changes while the session is open.
            if !closed {
                prop_assert_eq!(session.user_id(), identity.as_ref());
            } else {
                prop_assert_eq!(session.state(), &SessionState::Closed);
            }
            let actual: BTreeSet<RoomId> = session.joined_rooms().cloned().collect();
            prop_assert_eq!(&actual, &joined);
        }
    }
}
