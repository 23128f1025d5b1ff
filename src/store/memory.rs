//! In-memory store for tests.
//!
//! Implements every store trait plus the identity verifier over plain maps
//! behind one mutex. Each trait call bumps a counter so tests can assert that
//! a code path never reached storage.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    BoardStore, DocumentPatch, DocumentRow, DocumentStore, ListPatch, ListPosition, MembershipOracle, MessageRow,
    MessageStore, NewMessage, NewTask, StoreError, TaskListRow, TaskPatch, TaskPosition, TaskRow, UserSummary,
};
use crate::services::identity::{AuthError, Identity, IdentityVerifier};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserSummary>,
    members: HashSet<(Uuid, Uuid)>,
    tokens: HashMap<String, Uuid>,
    messages: Vec<MessageRow>,
    documents: HashMap<Uuid, DocumentRow>,
    lists: HashMap<Uuid, TaskListRow>,
    tasks: HashMap<Uuid, TaskRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    stall_ms: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, a login token for them, and return the user id.
    pub fn add_user(&self, name: &str, token: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        inner.users.insert(
            id,
            UserSummary { id, full_name: Some(name.to_owned()), email: Some(format!("{name}@example.com")) },
        );
        inner.tokens.insert(token.to_owned(), id);
        id
    }

    pub fn add_member(&self, workspace_id: Uuid, user_id: Uuid) {
        self.lock().members.insert((workspace_id, user_id));
    }

    pub fn remove_member(&self, workspace_id: Uuid, user_id: Uuid) {
        self.lock().members.remove(&(workspace_id, user_id));
    }

    /// Number of store trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent store call sleep before answering.
    pub fn stall_for(&self, delay: Duration) {
        self.stall_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    pub fn task(&self, task_id: Uuid) -> Option<TaskRow> {
        self.lock().tasks.get(&task_id).cloned()
    }

    pub fn list(&self, list_id: Uuid) -> Option<TaskListRow> {
        self.lock().lists.get(&list_id).cloned()
    }

    pub fn document(&self, document_id: Uuid) -> Option<DocumentRow> {
        self.lock().documents.get(&document_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    async fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for MemoryStore {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.lock()
            .tokens
            .get(token)
            .map(|user_id| Identity { user_id: *user_id })
            .ok_or_else(|| AuthError::InvalidToken("unknown token".into()))
    }
}

#[async_trait::async_trait]
impl MembershipOracle for MemoryStore {
    async fn is_member(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.touch().await;
        Ok(self.lock().members.contains(&(workspace_id, user_id)))
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, new: NewMessage) -> Result<MessageRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let row = MessageRow {
            id: Uuid::new_v4(),
            workspace_id: new.workspace_id,
            sender_id: new.sender_id,
            content: new.content,
            message_type: new.message_type,
            created_at: OffsetDateTime::now_utc(),
            sender: inner.users.get(&new.sender_id).cloned(),
        };
        inner.messages.push(row.clone());
        Ok(row)
    }

    async fn list_messages(&self, workspace_id: Uuid, limit: i64) -> Result<Vec<MessageRow>, StoreError> {
        self.touch().await;
        let inner = self.lock();
        let matching: Vec<MessageRow> = inner
            .messages
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect();
        let keep = usize::try_from(limit).unwrap_or(0);
        let skip = matching.len().saturating_sub(keep);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        workspace_id: Uuid,
        title: &str,
        created_by: Uuid,
    ) -> Result<DocumentRow, StoreError> {
        self.touch().await;
        let now = OffsetDateTime::now_utc();
        let row = DocumentRow {
            id: Uuid::new_v4(),
            workspace_id,
            title: title.to_owned(),
            content: String::new(),
            snapshot: None,
            created_by: Some(created_by),
            created_at: now,
            updated_at: now,
        };
        self.lock().documents.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError> {
        self.touch().await;
        self.lock()
            .documents
            .get(&document_id)
            .cloned()
            .ok_or(StoreError::not_found("document", document_id))
    }

    async fn list_documents(&self, workspace_id: Uuid) -> Result<Vec<DocumentRow>, StoreError> {
        self.touch().await;
        let mut rows: Vec<DocumentRow> = self
            .lock()
            .documents
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_document(&self, document_id: Uuid, patch: DocumentPatch) -> Result<DocumentRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or(StoreError::not_found("document", document_id))?;
        if let Some(title) = patch.title {
            doc.title = title;
        }
        if let Some(content) = patch.content {
            doc.content = content;
        }
        doc.updated_at = OffsetDateTime::now_utc();
        Ok(doc.clone())
    }

    async fn save_snapshot(
        &self,
        document_id: Uuid,
        snapshot: Vec<u8>,
        content: String,
    ) -> Result<DocumentRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or(StoreError::not_found("document", document_id))?;
        doc.snapshot = Some(snapshot);
        doc.content = content;
        doc.updated_at = OffsetDateTime::now_utc();
        Ok(doc.clone())
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<DocumentRow, StoreError> {
        self.touch().await;
        self.lock()
            .documents
            .remove(&document_id)
            .ok_or(StoreError::not_found("document", document_id))
    }
}

#[async_trait::async_trait]
impl BoardStore for MemoryStore {
    async fn create_list(&self, workspace_id: Uuid, title: &str, position: i32) -> Result<TaskListRow, StoreError> {
        self.touch().await;
        let row = TaskListRow {
            id: Uuid::new_v4(),
            workspace_id,
            title: title.to_owned(),
            position,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().lists.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_lists(&self, workspace_id: Uuid) -> Result<Vec<TaskListRow>, StoreError> {
        self.touch().await;
        let mut rows: Vec<TaskListRow> = self
            .lock()
            .lists
            .values()
            .filter(|l| l.workspace_id == workspace_id)
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.position);
        Ok(rows)
    }

    async fn update_list(&self, list_id: Uuid, patch: ListPatch) -> Result<TaskListRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let list = inner
            .lists
            .get_mut(&list_id)
            .ok_or(StoreError::not_found("list", list_id))?;
        if let Some(title) = patch.title {
            list.title = title;
        }
        if let Some(position) = patch.position {
            list.position = position;
        }
        Ok(list.clone())
    }

    async fn delete_list(&self, list_id: Uuid) -> Result<TaskListRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let removed = inner
            .lists
            .remove(&list_id)
            .ok_or(StoreError::not_found("list", list_id))?;
        inner.tasks.retain(|_, t| t.list_id != list_id);
        Ok(removed)
    }

    async fn update_list_positions(
        &self,
        workspace_id: Uuid,
        positions: &[ListPosition],
    ) -> Result<Vec<TaskListRow>, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        // Validate the whole batch before touching any row.
        if let Some(missing) = positions
            .iter()
            .find(|p| inner.lists.get(&p.id).is_none_or(|l| l.workspace_id != workspace_id))
        {
            return Err(StoreError::not_found("list", missing.id));
        }
        let mut updated = Vec::with_capacity(positions.len());
        for entry in positions {
            if let Some(list) = inner.lists.get_mut(&entry.id) {
                list.position = entry.position;
                updated.push(list.clone());
            }
        }
        Ok(updated)
    }

    async fn create_task(&self, new: NewTask) -> Result<TaskRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        if !inner.lists.contains_key(&new.list_id) {
            return Err(StoreError::not_found("list", new.list_id));
        }
        let row = TaskRow {
            id: Uuid::new_v4(),
            workspace_id: new.workspace_id,
            list_id: new.list_id,
            title: new.title,
            description: new.description,
            position: new.position,
            priority: None,
            assigned_to: None,
            created_by: Some(new.created_by),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.tasks.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_tasks(&self, workspace_id: Uuid) -> Result<Vec<TaskRow>, StoreError> {
        self.touch().await;
        let mut rows: Vec<TaskRow> = self
            .lock()
            .tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.position);
        Ok(rows)
    }

    async fn update_task(&self, task_id: Uuid, patch: TaskPatch) -> Result<TaskRow, StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::not_found("task", task_id))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(list_id) = patch.list_id {
            task.list_id = list_id;
        }
        if let Some(position) = patch.position {
            task.position = position;
        }
        if let Some(priority) = patch.priority {
            task.priority = Some(priority);
        }
        if let Some(assigned_to) = patch.assigned_to {
            task.assigned_to = Some(assigned_to);
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<TaskRow, StoreError> {
        self.touch().await;
        self.lock()
            .tasks
            .remove(&task_id)
            .ok_or(StoreError::not_found("task", task_id))
    }

    async fn update_task_position(&self, workspace_id: Uuid, position: TaskPosition) -> Result<(), StoreError> {
        self.touch().await;
        let mut inner = self.lock();
        let target_in_workspace = inner
            .lists
            .get(&position.list_id)
            .is_some_and(|l| l.workspace_id == workspace_id);
        let task = inner
            .tasks
            .get_mut(&position.id)
            .filter(|t| target_in_workspace && t.workspace_id == workspace_id)
            .ok_or(StoreError::not_found("task", position.id))?;
        task.list_id = position.list_id;
        task.position = position.position;
        Ok(())
    }
}
