//! Chat routes: message history and HTTP message posting.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::{publish, service_error_to_status};
use crate::services::chat;
use crate::state::AppState;
use crate::store::MessageRow;

#[derive(Deserialize)]
pub struct PostMessageBody {
    pub content: String,
    pub message_type: Option<String>,
}

/// `GET /api/chat/{workspace_id}/messages`: latest messages, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<MessageRow>>, StatusCode> {
    let rows = chat::history(&state, auth.user_id, workspace_id)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(rows))
}

/// `POST /api/chat/{workspace_id}/messages`: persist and emit `new_message`.
pub async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<PostMessageBody>,
) -> Result<(StatusCode, Json<MessageRow>), StatusCode> {
    let message_type = body.message_type.as_deref().unwrap_or("text");
    let published = chat::send_message(&state, auth.user_id, workspace_id, &body.content, message_type)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok((StatusCode::CREATED, Json(published.row)))
}
