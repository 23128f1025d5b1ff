//! Presence routes.
//!
//! The HTTP status update records the caller's status without a broadcast;
//! only the socket path announces changes.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::frame::Data;
use crate::services::presence::{PresenceRecord, PresenceStatus, snapshot_data};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateStatusBody {
    pub status: PresenceStatus,
}

/// `POST /api/presence/update`
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateStatusBody>,
) -> Json<PresenceRecord> {
    Json(state.presence.set_status(auth.user_id, body.status))
}

/// `GET /api/presence/workspace/{workspace_id}`. Returns every known record;
/// the workspace id is accepted but does not filter.
pub async fn workspace_presence(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(_workspace_id): Path<Uuid>,
) -> Json<Data> {
    Json(snapshot_data(&state.presence))
}
