//! Board service: task lists, tasks, and reorders.
//!
//! DESIGN
//! ======
//! Lists and tasks are addressed by id but always checked against the
//! workspace named in the request. Reorders go through the position
//! reconciler; an empty batch returns immediately without a membership
//! check, a store call, or an event.

use serde::Serialize;
use uuid::Uuid;

use super::access::{ServiceError, ensure_member};
use super::positions::{apply_list_positions, apply_task_positions};
use super::{Published, RoomEvent};
use crate::event::{
    LIST_CREATED, LIST_DELETED, LIST_UPDATED, LISTS_REORDERED, TASK_CREATED, TASK_DELETED, TASK_UPDATED,
    TASKS_REORDERED,
};
use crate::frame::{Data, to_data};
use crate::state::AppState;
use crate::store::{
    ListPatch, ListPosition, NewTask, StoreError, TaskListRow, TaskPatch, TaskPosition, TaskRow, bounded,
};

/// Whole board of a workspace, both halves ordered by position.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub lists: Vec<TaskListRow>,
    pub tasks: Vec<TaskRow>,
}

// =============================================================================
// LOOKUPS
// =============================================================================

async fn list_in_workspace(state: &AppState, workspace_id: Uuid, list_id: Uuid) -> Result<(), ServiceError> {
    let lists = bounded(state.config.store_timeout, state.board.list_lists(workspace_id)).await?;
    if lists.iter().any(|l| l.id == list_id) {
        Ok(())
    } else {
        Err(StoreError::not_found("list", list_id).into())
    }
}

async fn task_in_workspace(state: &AppState, workspace_id: Uuid, task_id: Uuid) -> Result<(), ServiceError> {
    let tasks = bounded(state.config.store_timeout, state.board.list_tasks(workspace_id)).await?;
    if tasks.iter().any(|t| t.id == task_id) {
        Ok(())
    } else {
        Err(StoreError::not_found("task", task_id).into())
    }
}

/// # Errors
///
/// `Forbidden` for non-members, `Store` on a failed read.
pub async fn load_board(state: &AppState, user_id: Uuid, workspace_id: Uuid) -> Result<BoardSnapshot, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    let lists = bounded(state.config.store_timeout, state.board.list_lists(workspace_id)).await?;
    let tasks = bounded(state.config.store_timeout, state.board.list_tasks(workspace_id)).await?;
    Ok(BoardSnapshot { lists, tasks })
}

// =============================================================================
// LISTS
// =============================================================================

/// # Errors
///
/// `Forbidden`, `Invalid` for a blank title, or `Store`.
pub async fn create_list(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    title: &str,
    position: i32,
) -> Result<Published<TaskListRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    if title.trim().is_empty() {
        return Err(ServiceError::Invalid("list title is required".into()));
    }
    let row = bounded(state.config.store_timeout, state.board.create_list(workspace_id, title, position)).await?;
    let event = RoomEvent::new(workspace_id, LIST_CREATED, to_data(&row));
    Ok(Published { row, event })
}

/// # Errors
///
/// `Forbidden`, or `Store(NotFound)` if the list is not in the workspace.
pub async fn update_list(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    list_id: Uuid,
    patch: ListPatch,
) -> Result<Published<TaskListRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    list_in_workspace(state, workspace_id, list_id).await?;
    let row = bounded(state.config.store_timeout, state.board.update_list(list_id, patch)).await?;
    let event = RoomEvent::new(workspace_id, LIST_UPDATED, to_data(&row));
    Ok(Published { row, event })
}

/// Delete a list and, with it, its tasks.
///
/// # Errors
///
/// As [`update_list`].
pub async fn delete_list(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    list_id: Uuid,
) -> Result<Published<TaskListRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    list_in_workspace(state, workspace_id, list_id).await?;
    let row = bounded(state.config.store_timeout, state.board.delete_list(list_id)).await?;
    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(row.id));
    let event = RoomEvent::new(workspace_id, LIST_DELETED, data);
    Ok(Published { row, event })
}

// =============================================================================
// TASKS
// =============================================================================

/// Input for [`create_task`].
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub list_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
}

/// # Errors
///
/// `Forbidden`, `Invalid` for a blank title, `Store(NotFound)` if the list is
/// not in the workspace.
pub async fn create_task(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    draft: TaskDraft,
) -> Result<Published<TaskRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    if draft.title.trim().is_empty() {
        return Err(ServiceError::Invalid("task title is required".into()));
    }
    list_in_workspace(state, workspace_id, draft.list_id).await?;
    let row = bounded(
        state.config.store_timeout,
        state.board.create_task(NewTask {
            workspace_id,
            list_id: draft.list_id,
            title: draft.title,
            description: draft.description,
            position: draft.position,
            created_by: user_id,
        }),
    )
    .await?;
    let event = RoomEvent::new(workspace_id, TASK_CREATED, to_data(&row));
    Ok(Published { row, event })
}

/// # Errors
///
/// `Forbidden`, or `Store(NotFound)` if the task (or a target list) is not in
/// the workspace.
pub async fn update_task(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    task_id: Uuid,
    patch: TaskPatch,
) -> Result<Published<TaskRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    task_in_workspace(state, workspace_id, task_id).await?;
    if let Some(list_id) = patch.list_id {
        list_in_workspace(state, workspace_id, list_id).await?;
    }
    let row = bounded(state.config.store_timeout, state.board.update_task(task_id, patch)).await?;
    let event = RoomEvent::new(workspace_id, TASK_UPDATED, to_data(&row));
    Ok(Published { row, event })
}

/// # Errors
///
/// As [`update_task`].
pub async fn delete_task(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    task_id: Uuid,
) -> Result<Published<TaskRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    task_in_workspace(state, workspace_id, task_id).await?;
    let row = bounded(state.config.store_timeout, state.board.delete_task(task_id)).await?;
    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(row.id));
    data.insert("list_id".into(), serde_json::json!(row.list_id));
    let event = RoomEvent::new(workspace_id, TASK_DELETED, data);
    Ok(Published { row, event })
}

// =============================================================================
// REORDERS
// =============================================================================

/// Apply a task reorder. `None` event for an empty batch.
///
/// # Errors
///
/// `Forbidden`, or the first failing row's `Store` error (earlier rows stay
/// moved).
pub async fn reorder_tasks(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    batch: Vec<TaskPosition>,
) -> Result<(Vec<TaskPosition>, Option<RoomEvent>), ServiceError> {
    if batch.is_empty() {
        return Ok((Vec::new(), None));
    }
    ensure_member(state, workspace_id, user_id).await?;
    let applied = apply_task_positions(state.board.as_ref(), state.config.store_timeout, workspace_id, &batch).await?;
    let mut data = Data::new();
    data.insert("tasks".into(), serde_json::to_value(&applied).unwrap_or_default());
    Ok((applied, Some(RoomEvent::new(workspace_id, TASKS_REORDERED, data))))
}

/// Apply a list reorder atomically. `None` event for an empty batch.
///
/// # Errors
///
/// `Forbidden`, or `Store` (nothing moved).
pub async fn reorder_lists(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    batch: Vec<ListPosition>,
) -> Result<(Vec<TaskListRow>, Option<RoomEvent>), ServiceError> {
    if batch.is_empty() {
        return Ok((Vec::new(), None));
    }
    ensure_member(state, workspace_id, user_id).await?;
    let rows = apply_list_positions(state.board.as_ref(), state.config.store_timeout, workspace_id, &batch).await?;
    let mut data = Data::new();
    data.insert("lists".into(), serde_json::to_value(&batch).unwrap_or_default());
    Ok((rows, Some(RoomEvent::new(workspace_id, LISTS_REORDERED, data))))
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
