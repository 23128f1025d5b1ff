//! Postgres-backed implementation of every store trait.
//!
//! DESIGN
//! ======
//! One `PgStore` wraps the shared pool and implements membership, messages,
//! documents and the task board. Partial updates use `COALESCE` so absent
//! patch fields keep their stored value.
//!
//! TRADE-OFFS
//! ==========
//! List reorders run in a single transaction; task reorders are composed by
//! the reconciler from independent single-row updates. The two paths differ
//! on purpose and must stay that way until the task path is made atomic.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{
    BoardStore, DocumentPatch, DocumentRow, DocumentStore, ListPatch, ListPosition, MembershipOracle, MessageRow,
    MessageStore, NewMessage, NewTask, StoreError, TaskListRow, TaskPatch, TaskPosition, TaskRow, UserSummary,
};

const DOCUMENT_COLUMNS: &str = "id, workspace_id, title, content, snapshot, created_by, created_at, updated_at";
const LIST_COLUMNS: &str = "id, workspace_id, title, position, created_at";
const TASK_COLUMNS: &str =
    "id, workspace_id, list_id, title, description, position, priority, assigned_to, created_by, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

#[async_trait::async_trait]
impl MembershipOracle for PgStore {
    async fn is_member(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM workspace_members WHERE workspace_id = $1 AND user_id = $2
            )",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

#[async_trait::async_trait]
impl MessageStore for PgStore {
    async fn create_message(&self, new: NewMessage) -> Result<MessageRow, StoreError> {
        let row = sqlx::query(
            r"WITH inserted AS (
                  INSERT INTO messages (id, workspace_id, sender_id, content, message_type)
                  VALUES ($1, $2, $3, $4, $5)
                  RETURNING id, workspace_id, sender_id, content, message_type, created_at
              )
              SELECT i.*, u.id AS user_id, u.full_name, u.email
              FROM inserted i
              LEFT JOIN users u ON u.id = i.sender_id",
        )
        .bind(Uuid::new_v4())
        .bind(new.workspace_id)
        .bind(new.sender_id)
        .bind(&new.content)
        .bind(&new.message_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(message_from_row(&row))
    }

    async fn list_messages(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query(
            r"SELECT * FROM (
                  SELECT m.id, m.workspace_id, m.sender_id, m.content, m.message_type, m.created_at,
                         u.id AS user_id, u.full_name, u.email
                  FROM messages m
                  LEFT JOIN users u ON u.id = m.sender_id
                  WHERE m.workspace_id = $1
                  ORDER BY m.created_at DESC
                  LIMIT $2
              ) latest
              ORDER BY created_at ASC",
        )
        .bind(workspace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}

fn message_from_row(row: &PgRow) -> MessageRow {
    let user_id: Option<Uuid> = row.get("user_id");
    MessageRow {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        message_type: row.get("message_type"),
        created_at: row.get("created_at"),
        sender: user_id.map(|id| UserSummary { id, full_name: row.get("full_name"), email: row.get("email") }),
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[async_trait::async_trait]
impl DocumentStore for PgStore {
    async fn create_document(
        &self,
        workspace_id: Uuid,
        title: &str,
        created_by: Uuid,
    ) -> Result<DocumentRow, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO documents (id, workspace_id, title, created_by)
             VALUES ($1, $2, $3, $4)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(title)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(document_from_row(&row))
    }

    async fn find_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError> {
        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"))
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("document", document_id))?;
        Ok(document_from_row(&row))
    }

    async fn list_documents(&self, workspace_id: Uuid) -> Result<Vec<DocumentRow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn update_document(&self, document_id: Uuid, patch: DocumentPatch) -> Result<DocumentRow, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE documents
             SET title = COALESCE($2, title), content = COALESCE($3, content), updated_at = now()
             WHERE id = $1
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(document_id)
        .bind(patch.title)
        .bind(patch.content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::not_found("document", document_id))?;
        Ok(document_from_row(&row))
    }

    async fn save_snapshot(
        &self,
        document_id: Uuid,
        snapshot: Vec<u8>,
        content: String,
    ) -> Result<DocumentRow, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE documents
             SET snapshot = $2, content = $3, updated_at = now()
             WHERE id = $1
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(document_id)
        .bind(snapshot)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::not_found("document", document_id))?;
        Ok(document_from_row(&row))
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM documents WHERE id = $1 RETURNING {DOCUMENT_COLUMNS}"))
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("document", document_id))?;
        Ok(document_from_row(&row))
    }
}

fn document_from_row(row: &PgRow) -> DocumentRow {
    DocumentRow {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        title: row.get("title"),
        content: row.get("content"),
        snapshot: row.get("snapshot"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// =============================================================================
// BOARD
// =============================================================================

#[async_trait::async_trait]
impl BoardStore for PgStore {
    async fn create_list(&self, workspace_id: Uuid, title: &str, position: i32) -> Result<TaskListRow, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO task_lists (id, workspace_id, title, position)
             VALUES ($1, $2, $3, $4)
             RETURNING {LIST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.pool)
        .await?;
        Ok(list_from_row(&row))
    }

    async fn list_lists(&self, workspace_id: Uuid) -> Result<Vec<TaskListRow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LIST_COLUMNS} FROM task_lists WHERE workspace_id = $1 ORDER BY position ASC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(list_from_row).collect())
    }

    async fn update_list(&self, list_id: Uuid, patch: ListPatch) -> Result<TaskListRow, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE task_lists
             SET title = COALESCE($2, title), position = COALESCE($3, position)
             WHERE id = $1
             RETURNING {LIST_COLUMNS}"
        ))
        .bind(list_id)
        .bind(patch.title)
        .bind(patch.position)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::not_found("list", list_id))?;
        Ok(list_from_row(&row))
    }

    async fn delete_list(&self, list_id: Uuid) -> Result<TaskListRow, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM task_lists WHERE id = $1 RETURNING {LIST_COLUMNS}"))
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("list", list_id))?;
        Ok(list_from_row(&row))
    }

    async fn update_list_positions(
        &self,
        workspace_id: Uuid,
        positions: &[ListPosition],
    ) -> Result<Vec<TaskListRow>, StoreError> {
        // Dropping the transaction on any early return rolls every row back.
        let mut tx = self.pool.begin().await?;
        let mut updated = Vec::with_capacity(positions.len());
        for entry in positions {
            let row = sqlx::query(&format!(
                "UPDATE task_lists SET position = $2 WHERE id = $1 AND workspace_id = $3 RETURNING {LIST_COLUMNS}"
            ))
            .bind(entry.id)
            .bind(entry.position)
            .bind(workspace_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::not_found("list", entry.id))?;
            updated.push(list_from_row(&row));
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn create_task(&self, new: NewTask) -> Result<TaskRow, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO tasks (id, workspace_id, list_id, title, description, position, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.workspace_id)
        .bind(new.list_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.position)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(task_from_row(&row))
    }

    async fn list_tasks(&self, workspace_id: Uuid) -> Result<Vec<TaskRow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE workspace_id = $1 ORDER BY position ASC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    async fn update_task(&self, task_id: Uuid, patch: TaskPatch) -> Result<TaskRow, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE tasks
             SET title = COALESCE($2, title),
                 description = COALESCE($3, description),
                 list_id = COALESCE($4, list_id),
                 position = COALESCE($5, position),
                 priority = COALESCE($6, priority),
                 assigned_to = COALESCE($7, assigned_to),
                 updated_at = now()
             WHERE id = $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task_id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.list_id)
        .bind(patch.position)
        .bind(patch.priority)
        .bind(patch.assigned_to)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::not_found("task", task_id))?;
        Ok(task_from_row(&row))
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<TaskRow, StoreError> {
        let row = sqlx::query(&format!("DELETE FROM tasks WHERE id = $1 RETURNING {TASK_COLUMNS}"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::not_found("task", task_id))?;
        Ok(task_from_row(&row))
    }

    async fn update_task_position(&self, workspace_id: Uuid, position: TaskPosition) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET list_id = $2, position = $3, updated_at = now()
             WHERE id = $1 AND workspace_id = $4
               AND EXISTS (SELECT 1 FROM task_lists WHERE id = $2 AND workspace_id = $4)",
        )
        .bind(position.id)
        .bind(position.list_id)
        .bind(position.position)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", position.id));
        }
        Ok(())
    }
}

fn list_from_row(row: &PgRow) -> TaskListRow {
    TaskListRow {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        title: row.get("title"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}

fn task_from_row(row: &PgRow) -> TaskRow {
    TaskRow {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        list_id: row.get("list_id"),
        title: row.get("title"),
        description: row.get("description"),
        position: row.get("position"),
        priority: row.get("priority"),
        assigned_to: row.get("assigned_to"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
