//! Document routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::{publish, service_error_to_status};
use crate::frame::Data;
use crate::services::document;
use crate::state::AppState;
use crate::store::{DocumentPatch, DocumentRow};

#[derive(Deserialize)]
pub struct CreateDocumentBody {
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct SnapshotBody {
    pub snapshot: Vec<u8>,
    #[serde(default)]
    pub content: String,
}

/// `GET /api/documents/{workspace_id}`: newest first.
pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentRow>>, StatusCode> {
    let rows = document::list_documents(&state, auth.user_id, workspace_id)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(rows))
}

/// `POST /api/documents/{workspace_id}`
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreateDocumentBody>,
) -> Result<(StatusCode, Json<DocumentRow>), StatusCode> {
    let title = body.title.as_deref().unwrap_or("Untitled Document");
    let published = document::create_document(&state, auth.user_id, workspace_id, title)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok((StatusCode::CREATED, Json(published.row)))
}

/// `GET /api/documents/{workspace_id}/document/{document_id}`
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DocumentRow>, StatusCode> {
    let row = document::get_document(&state, auth.user_id, workspace_id, document_id)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(row))
}

/// `PUT /api/documents/{workspace_id}/document/{document_id}`: emits `document_updated`.
pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, document_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<DocumentRow>, StatusCode> {
    let published = document::update_document(&state, auth.user_id, workspace_id, document_id, patch)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(published.row))
}

/// `DELETE /api/documents/{workspace_id}/document/{document_id}`: emits `document_deleted`.
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let published = document::delete_document(&state, auth.user_id, workspace_id, document_id)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(serde_json::json!({ "id": published.row.id })))
}

/// `POST /api/documents/{workspace_id}/document/{document_id}/snapshot`: no broadcast.
pub async fn save_snapshot(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, document_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<SnapshotBody>,
) -> Result<Json<Data>, StatusCode> {
    let row = document::save_snapshot(&state, auth.user_id, workspace_id, document_id, body.snapshot, body.content)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(document::document_data(&row)))
}
