//! Position reconciler: applies drag-and-drop reorder batches.
//!
//! TRADE-OFFS
//! ==========
//! Task and list batches are deliberately asymmetric:
//! - Tasks move one row at a time. The first failure stops the batch and is
//!   returned, and rows already written stay written. A client that sees the
//!   error is expected to refetch the board.
//! - Lists move in a single store call that the store runs in one
//!   transaction, so a list batch lands entirely or not at all.
//!
//! Dense positions are not enforced. Two clients reordering the same list at
//! once can leave duplicate positions; the last writer wins per row.

use std::time::Duration;

use uuid::Uuid;

use crate::store::{BoardStore, ListPosition, StoreError, TaskListRow, TaskPosition, bounded};

/// Apply task positions in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first failing row's error. Earlier rows are not rolled back.
pub async fn apply_task_positions(
    store: &dyn BoardStore,
    limit: Duration,
    workspace_id: Uuid,
    batch: &[TaskPosition],
) -> Result<Vec<TaskPosition>, StoreError> {
    for (index, position) in batch.iter().enumerate() {
        if let Err(e) = bounded(limit, store.update_task_position(workspace_id, *position)).await {
            tracing::warn!(task_id = %position.id, applied = index, error = %e, "positions: task batch aborted");
            return Err(e);
        }
    }
    Ok(batch.to_vec())
}

/// Apply list positions in one atomic store call.
///
/// # Errors
///
/// Returns the store error; no list has moved in that case.
pub async fn apply_list_positions(
    store: &dyn BoardStore,
    limit: Duration,
    workspace_id: Uuid,
    batch: &[ListPosition],
) -> Result<Vec<TaskListRow>, StoreError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    bounded(limit, store.update_list_positions(workspace_id, batch)).await
}

#[cfg(test)]
#[path = "positions_test.rs"]
mod tests;
