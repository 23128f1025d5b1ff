//! Workspace access checks and the service-layer error type.
//!
//! Every room-scoped operation asks the membership oracle first. The socket
//! router turns `Forbidden` into a silent drop; HTTP handlers turn it into
//! 403.

use uuid::Uuid;

use crate::frame::ErrorCode;
use crate::state::AppState;
use crate::store::{StoreError, bounded};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not a member of workspace {workspace_id}")]
    Forbidden { workspace_id: Uuid },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for ServiceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden { .. } => "E_FORBIDDEN",
            Self::Invalid(_) => "E_INVALID",
            Self::Store(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            _ => false,
        }
    }
}

/// Fail with `Forbidden` unless `user_id` belongs to `workspace_id`.
///
/// # Errors
///
/// Returns `Forbidden` on a negative answer, `Store` if the oracle fails or
/// times out.
pub async fn ensure_member(state: &AppState, workspace_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
    let is_member = bounded(state.config.store_timeout, state.membership.is_member(workspace_id, user_id)).await?;
    if is_member {
        Ok(())
    } else {
        Err(ServiceError::Forbidden { workspace_id })
    }
}

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
