//! Token verifier backed by a shared table.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use studyroom_proto::UserId;
use studyroom_server::{AuthError, TokenVerifier};

/// Maps opaque tokens to identities. Anything not in the table is rejected.
///
/// Clones share the table, so a test can register users after the verifier
/// has been handed to a gateway.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: Arc<RwLock<HashMap<String, UserId>>>,
}

impl StaticTokenVerifier {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user_id`.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.insert(token, user_id);
        self
    }

    /// Accept `token` as `user_id`.
    #[allow(clippy::expect_used)]
    pub fn insert(&self, token: impl Into<String>, user_id: impl Into<String>) {
        self.tokens
            .write()
            .expect("invariant: token table lock is never poisoned")
            .insert(token.into(), UserId::new(user_id));
    }

    /// Register the conventional token for `user_id` and return it.
    pub fn register(&self, user_id: &str) -> String {
        let token = Self::token_for(user_id);
        self.insert(token.clone(), user_id);
        token
    }

    /// Conventional token for `user_id`.
    pub fn token_for(user_id: &str) -> String {
        format!("token-{user_id}")
    }
}

impl TokenVerifier for StaticTokenVerifier {
    #[allow(clippy::expect_used)]
    fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens
            .read()
            .expect("invariant: token table lock is never poisoned")
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
