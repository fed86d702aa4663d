//! Bearer token verification.
//!
//! Stateless: a token either carries a valid signature and an unexpired `exp`
//! claim, or it is rejected. Every rejection surfaces as the same
//! [`AuthError::InvalidToken`]; the underlying reason goes to the debug log
//! only, so clients cannot probe which check failed.

use std::{fmt, time::Duration};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use studyroom_proto::UserId;
use thiserror::Error;

/// Errors from token verification and issuance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token is malformed, has a bad signature, or has expired.
    #[error("invalid token")]
    InvalidToken,

    /// Verifier cannot be constructed (e.g. empty secret).
    #[error("auth configuration error: {0}")]
    Config(String),

    /// Token could not be signed.
    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Verifies bearer credentials and extracts the caller's identity.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Validate `token` and return the identity it carries.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` for any malformed, forged, or expired token
    fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub id: String,
    /// Account email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiration time (Unix seconds)
    pub exp: u64,
}

/// HS256 JWT verifier with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier").field("algorithm", &Algorithm::HS256).finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    ///
    /// # Errors
    ///
    /// - `AuthError::Config` if the secret is empty
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Config("JWT secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Mint a token for `user_id` valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// - `AuthError::Encode` if signing fails
    pub fn issue(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let exp = jsonwebtoken::get_current_timestamp().saturating_add(ttl.as_secs());
        self.issue_with_expiry(user_id, email, exp)
    }

    /// Mint a token with an explicit `exp` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - `AuthError::Encode` if signing fails
    pub fn issue_with_expiry(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        exp: u64,
    ) -> Result<String, AuthError> {
        let claims =
            Claims { id: user_id.as_str().to_string(), email: email.map(str::to_string), exp };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Encode(e.to_string()))
    }
}

impl TokenVerifier for JwtVerifier {
    fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AuthError::InvalidToken
        })?;

        if data.claims.id.is_empty() {
            tracing::debug!("token rejected: empty id claim");
            return Err(AuthError::InvalidToken);
        }

        Ok(UserId::new(data.claims.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_validates() {
        let verifier = JwtVerifier::new(SECRET).unwrap();
        let token = verifier
            .issue(&UserId::new("u1"), Some("u1@example.com"), Duration::from_secs(60))
            .unwrap();

        assert_eq!(verifier.validate(&token), Ok(UserId::new("u1")));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(JwtVerifier::new(""), Err(AuthError::Config(_))));
    }

    #[test]
    fn expired_token_is_invalid() {
        let verifier = JwtVerifier::new(SECRET).unwrap();
        let past = jsonwebtoken::get_current_timestamp() - 3_600;
        let token = verifier.issue_with_expiry(&UserId::new("u1"), None, past).unwrap();

        assert_eq!(verifier.validate(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn recently_expired_token_is_invalid() {
        let verifier = JwtVerifier::new(SECRET).unwrap();
        let past = jsonwebtoken::get_current_timestamp() - 30;
        let token = verifier.issue_with_expiry(&UserId::new("u1"), None, past).unwrap();

        assert_eq!(verifier.validate(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let ours = JwtVerifier::new(SECRET).unwrap();
        let theirs = JwtVerifier::new("other-secret").unwrap();
        let token = theirs.issue(&UserId::new("u1"), None, Duration::from_secs(60)).unwrap();

        assert_eq!(ours.validate(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn garbage_is_invalid() {
        let verifier = JwtVerifier::new(SECRET).unwrap();

        assert_eq!(verifier.validate(""), Err(AuthError::InvalidToken));
        assert_eq!(verifier.validate("not.a.jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn empty_id_claim_is_invalid() {
        let verifier = JwtVerifier::new(SECRET).unwrap();
        let token = verifier.issue(&UserId::new(""), None, Duration::from_secs(60)).unwrap();

        assert_eq!(verifier.validate(&token), Err(AuthError::InvalidToken));
    }
}
