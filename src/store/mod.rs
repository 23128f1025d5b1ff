//! Data-layer seams consumed by the gateway.
//!
//! ARCHITECTURE
//! ============
//! Durable state (messages, documents, task lists, tasks, workspace
//! membership) lives behind object-safe async traits so the router and HTTP
//! handlers never touch SQL directly. `PgStore` is the production
//! implementation; tests use the in-memory store.
//!
//! ERROR HANDLING
//! ==============
//! Every method returns `StoreError`. Callers bound each call with
//! `bounded`, which turns an elapsed deadline into `StoreError::Timeout`.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::frame::ErrorCode;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Timeout(_) => "E_STORE_TIMEOUT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Bound an external-store call so a stalled backend cannot park a
/// connection task forever.
///
/// # Errors
///
/// Returns the call's own error, or `StoreError::Timeout` if `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

// =============================================================================
// ROWS
// =============================================================================

/// Minimal user projection attached to rows that reference a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Sender identity, joined from `users` when available.
    pub sender: Option<UserSummary>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub workspace_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    /// Plain-text rendering of the latest snapshot.
    pub content: String,
    /// Opaque sync-protocol snapshot. The gateway never interprets it.
    pub snapshot: Option<Vec<u8>>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl DocumentPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub position: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub workspace_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub list_id: Option<Uuid>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

/// One entry of a drag-and-drop task reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPosition {
    pub id: Uuid,
    pub list_id: Uuid,
    pub position: i32,
}

/// One entry of a list reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPosition {
    pub id: Uuid,
    pub position: i32,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Answers "does this user belong to this workspace".
#[async_trait::async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn is_member(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, new: NewMessage) -> Result<MessageRow, StoreError>;

    /// Latest `limit` messages of a workspace, returned oldest first.
    async fn list_messages(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<MessageRow>, StoreError>;
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, workspace_id: Uuid, title: &str, created_by: Uuid)
    -> Result<DocumentRow, StoreError>;

    async fn find_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError>;

    /// Documents of a workspace, newest first.
    async fn list_documents(&self, workspace_id: Uuid) -> Result<Vec<DocumentRow>, StoreError>;

    async fn update_document(&self, document_id: Uuid, patch: DocumentPatch) -> Result<DocumentRow, StoreError>;

    async fn save_snapshot(&self, document_id: Uuid, snapshot: Vec<u8>, content: String)
    -> Result<DocumentRow, StoreError>;

    async fn delete_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError>;
}

/// Task lists and tasks of a workspace board.
#[async_trait::async_trait]
pub trait BoardStore: Send + Sync {
    async fn create_list(&self, workspace_id: Uuid, title: &str, position: i32) -> Result<TaskListRow, StoreError>;

    /// Lists of a workspace ordered by position.
    async fn list_lists(&self, workspace_id: Uuid) -> Result<Vec<TaskListRow>, StoreError>;

    async fn update_list(&self, list_id: Uuid, patch: ListPatch) -> Result<TaskListRow, StoreError>;

    async fn delete_list(&self, list_id: Uuid) -> Result<TaskListRow, StoreError>;

    /// Apply every list position in one atomic write. Either all rows move or
    /// none do. A list outside `workspace_id` reads as `NotFound`.
    async fn update_list_positions(
        &self,
        workspace_id: Uuid,
        positions: &[ListPosition],
    ) -> Result<Vec<TaskListRow>, StoreError>;

    async fn create_task(&self, new: NewTask) -> Result<TaskRow, StoreError>;

    /// Tasks of a workspace ordered by position.
    async fn list_tasks(&self, workspace_id: Uuid) -> Result<Vec<TaskRow>, StoreError>;

    async fn update_task(&self, task_id: Uuid, patch: TaskPatch) -> Result<TaskRow, StoreError>;

    async fn delete_task(&self, task_id: Uuid) -> Result<TaskRow, StoreError>;

    /// Move a single task. Batches are composed by the position reconciler.
    /// A task or target list outside `workspace_id` reads as `NotFound`.
    async fn update_task_position(&self, workspace_id: Uuid, position: TaskPosition) -> Result<(), StoreError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
