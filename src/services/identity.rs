//! Identity verification for the socket handshake and HTTP bearer tokens.
//!
//! ARCHITECTURE
//! ============
//! Tokens are issued by the account service; the gateway only verifies them.
//! `IdentityVerifier` is the seam, `JwtVerifier` the production
//! implementation (HS256, claims carry the user id in `id` or `sub`).

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use uuid::Uuid;

/// Authenticated identity bound to a connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("access token required")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl crate::frame::ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "E_AUTH_MISSING",
            Self::InvalidToken(_) => "E_AUTH_INVALID",
        }
    }
}

#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

// =============================================================================
// JWT
// =============================================================================

/// Claims accepted from the account service. The user id travels in `id`
/// (some issuers fill `sub` instead); `exp` is optional and only checked
/// when present.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    sub: Option<Uuid>,
    #[serde(default)]
    #[allow(dead_code)]
    exp: Option<u64>,
}

impl Claims {
    fn user_id(&self) -> Option<Uuid> {
        self.id.or(self.sub)
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        // Account-service tokens carry no `exp`; a present one is still enforced.
        validation.required_spec_claims.clear();
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }

    /// Synchronous decode; exposed for the HTTP extractor and tests.
    ///
    /// # Errors
    ///
    /// Returns `MissingToken` for an empty token and `InvalidToken` for a bad
    /// signature, an expired token, or claims without a user id.
    pub fn decode(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data =
            decode::<Claims>(token, &self.key, &self.validation).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let user_id = data
            .claims
            .user_id()
            .ok_or_else(|| AuthError::InvalidToken("token carries no user id".into()))?;
        Ok(Identity { user_id })
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.decode(token)
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
