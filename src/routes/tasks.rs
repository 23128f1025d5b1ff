//! Task board routes: lists, tasks, reorders.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::{publish, service_error_to_status};
use crate::services::board::{self, BoardSnapshot, TaskDraft};
use crate::state::AppState;
use crate::store::{ListPatch, ListPosition, TaskListRow, TaskPatch, TaskPosition, TaskRow};

#[derive(Deserialize)]
pub struct CreateListBody {
    pub title: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Deserialize)]
pub struct CreateTaskBody {
    pub list_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub position: i32,
}

/// Task reorder body. `tasks` is optional here so a missing array is a 400
/// from the handler rather than a 422 from the extractor.
#[derive(Deserialize)]
pub struct ReorderTasksBody {
    pub tasks: Option<Vec<TaskPosition>>,
}

#[derive(Deserialize)]
pub struct ReorderListsBody {
    pub lists: Option<Vec<ListPosition>>,
}

/// `GET /api/tasks/{workspace_id}/board`
pub async fn get_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<BoardSnapshot>, StatusCode> {
    let snapshot = board::load_board(&state, auth.user_id, workspace_id)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(snapshot))
}

// =============================================================================
// LISTS
// =============================================================================

/// `POST /api/tasks/{workspace_id}/lists`
pub async fn create_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreateListBody>,
) -> Result<(StatusCode, Json<TaskListRow>), StatusCode> {
    let published = board::create_list(&state, auth.user_id, workspace_id, &body.title, body.position)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok((StatusCode::CREATED, Json(published.row)))
}

/// `PUT /api/tasks/{workspace_id}/lists/{list_id}`
pub async fn update_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, list_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<ListPatch>,
) -> Result<Json<TaskListRow>, StatusCode> {
    let published = board::update_list(&state, auth.user_id, workspace_id, list_id, patch)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(published.row))
}

/// `DELETE /api/tasks/{workspace_id}/lists/{list_id}`
pub async fn delete_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, list_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let published = board::delete_list(&state, auth.user_id, workspace_id, list_id)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(serde_json::json!({ "id": published.row.id })))
}

/// `PUT /api/tasks/{workspace_id}/lists/reorder` (single atomic write)
pub async fn reorder_lists(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<ReorderListsBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(batch) = body.lists else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let (rows, event) = board::reorder_lists(&state, auth.user_id, workspace_id, batch)
        .await
        .map_err(service_error_to_status)?;
    if let Some(event) = event {
        publish(&state, &event, auth.user_id);
    }
    Ok(Json(serde_json::json!({ "lists": rows })))
}

// =============================================================================
// TASKS
// =============================================================================

/// `POST /api/tasks/{workspace_id}/tasks`
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreateTaskBody>,
) -> Result<(StatusCode, Json<TaskRow>), StatusCode> {
    let draft = TaskDraft {
        list_id: body.list_id,
        title: body.title,
        description: body.description,
        position: body.position,
    };
    let published = board::create_task(&state, auth.user_id, workspace_id, draft)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok((StatusCode::CREATED, Json(published.row)))
}

/// `PUT /api/tasks/{workspace_id}/tasks/{task_id}`
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, task_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<TaskRow>, StatusCode> {
    let published = board::update_task(&state, auth.user_id, workspace_id, task_id, patch)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(published.row))
}

/// `DELETE /api/tasks/{workspace_id}/tasks/{task_id}`
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let published = board::delete_task(&state, auth.user_id, workspace_id, task_id)
        .await
        .map_err(service_error_to_status)?;
    publish(&state, &published.event, auth.user_id);
    Ok(Json(serde_json::json!({ "id": published.row.id })))
}

/// `PUT /api/tasks/{workspace_id}/reorder` (row by row, not atomic)
pub async fn reorder_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<ReorderTasksBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(batch) = body.tasks else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let (applied, event) = board::reorder_tasks(&state, auth.user_id, workspace_id, batch)
        .await
        .map_err(service_error_to_status)?;
    if let Some(event) = event {
        publish(&state, &event, auth.user_id);
    }
    Ok(Json(serde_json::json!({ "tasks": applied })))
}
