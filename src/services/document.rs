//! Document service: metadata CRUD and snapshot persistence.
//!
//! DESIGN
//! ======
//! Collaborative editing itself runs over a separate sync protocol. The
//! gateway only stores its opaque snapshot (plus a plain-text rendering)
//! and relays metadata changes. Snapshot saves are not broadcast: peers
//! already have the state through the sync channel.
//!
//! Every id-addressed call first loads the document and checks it belongs
//! to the workspace named in the request, so membership in one workspace
//! never reaches documents of another.

use uuid::Uuid;

use super::access::{ServiceError, ensure_member};
use super::{Published, RoomEvent};
use crate::event::{DOCUMENT_CREATED, DOCUMENT_DELETED, DOCUMENT_UPDATED};
use crate::frame::{Data, to_data};
use crate::state::AppState;
use crate::store::{DocumentPatch, DocumentRow, StoreError, bounded};

/// Broadcast payload: the row without its snapshot blob.
#[must_use]
pub fn document_data(row: &DocumentRow) -> Data {
    let mut data = to_data(row);
    data.remove("snapshot");
    data
}

async fn find_in_workspace(state: &AppState, workspace_id: Uuid, document_id: Uuid) -> Result<DocumentRow, ServiceError> {
    let row = bounded(state.config.store_timeout, state.documents.find_document(document_id)).await?;
    if row.workspace_id != workspace_id {
        return Err(StoreError::not_found("document", document_id).into());
    }
    Ok(row)
}

/// # Errors
///
/// `Forbidden` for non-members, `Store` on a failed read.
pub async fn list_documents(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
) -> Result<Vec<DocumentRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    Ok(bounded(state.config.store_timeout, state.documents.list_documents(workspace_id)).await?)
}

/// # Errors
///
/// `Forbidden` for non-members, `Invalid` for a blank title, `Store` on a
/// failed write.
pub async fn create_document(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    title: &str,
) -> Result<Published<DocumentRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    if title.trim().is_empty() {
        return Err(ServiceError::Invalid("document title is required".into()));
    }
    let row = bounded(state.config.store_timeout, state.documents.create_document(workspace_id, title, user_id)).await?;
    let event = RoomEvent::new(workspace_id, DOCUMENT_CREATED, document_data(&row));
    Ok(Published { row, event })
}

/// # Errors
///
/// `Forbidden` for non-members, `Store(NotFound)` if the document is missing
/// or belongs to another workspace.
pub async fn get_document(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentRow, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    find_in_workspace(state, workspace_id, document_id).await
}

/// Apply a partial metadata update and produce `document_updated`.
///
/// # Errors
///
/// `Invalid` for an empty patch, otherwise as [`get_document`].
pub async fn update_document(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    document_id: Uuid,
    patch: DocumentPatch,
) -> Result<Published<DocumentRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    if patch.is_empty() {
        return Err(ServiceError::Invalid("nothing to update".into()));
    }
    find_in_workspace(state, workspace_id, document_id).await?;
    let row = bounded(state.config.store_timeout, state.documents.update_document(document_id, patch)).await?;
    let event = RoomEvent::new(workspace_id, DOCUMENT_UPDATED, document_data(&row));
    Ok(Published { row, event })
}

/// Persist the sync snapshot and its text rendering. No room event.
///
/// # Errors
///
/// As [`get_document`].
pub async fn save_snapshot(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    document_id: Uuid,
    snapshot: Vec<u8>,
    content: String,
) -> Result<DocumentRow, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    find_in_workspace(state, workspace_id, document_id).await?;
    Ok(bounded(state.config.store_timeout, state.documents.save_snapshot(document_id, snapshot, content)).await?)
}

/// Delete a document. The event payload carries only its id.
///
/// # Errors
///
/// As [`get_document`].
pub async fn delete_document(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    document_id: Uuid,
) -> Result<Published<DocumentRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    find_in_workspace(state, workspace_id, document_id).await?;
    let row = bounded(state.config.store_timeout, state.documents.delete_document(document_id)).await?;
    let mut data = Data::new();
    data.insert("id".into(), serde_json::json!(row.id));
    let event = RoomEvent::new(workspace_id, DOCUMENT_DELETED, data);
    Ok(Published { row, event })
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
