//! Bearer-token authentication for the HTTP surface.
//!
//! A missing token is 401; a token the verifier rejects is 403. The
//! WebSocket upgrade authenticates separately from its `token` query
//! parameter (see `ws.rs`).

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use uuid::Uuid;

use crate::services::identity::AuthError;
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated caller. Use as a handler parameter to require a token.
pub struct AuthUser {
    pub user_id: Uuid,
}

pub(crate) fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingToken => StatusCode::UNAUTHORIZED,
        AuthError::InvalidToken(_) => StatusCode::FORBIDDEN,
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Err(StatusCode::UNAUTHORIZED);
        };

        let app_state = AppState::from_ref(state);
        let identity = app_state.identity.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "auth: bearer token rejected");
            auth_error_to_status(&e)
        })?;

        Ok(Self { user_id: identity.user_id })
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
