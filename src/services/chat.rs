//! Chat service: persist workspace messages and read recent history.

use uuid::Uuid;

use super::access::{ServiceError, ensure_member};
use super::{Published, RoomEvent};
use crate::event::NEW_MESSAGE;
use crate::frame::to_data;
use crate::state::AppState;
use crate::store::{MessageRow, NewMessage, bounded};

/// Persist a message and return it with its `new_message` event.
///
/// # Errors
///
/// `Forbidden` for non-members, `Invalid` for blank content, `Store` on a
/// failed or timed-out write.
pub async fn send_message(
    state: &AppState,
    user_id: Uuid,
    workspace_id: Uuid,
    content: &str,
    message_type: &str,
) -> Result<Published<MessageRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    if content.trim().is_empty() {
        return Err(ServiceError::Invalid("message content is required".into()));
    }

    let row = bounded(
        state.config.store_timeout,
        state.messages.create_message(NewMessage {
            workspace_id,
            sender_id: user_id,
            content: content.to_owned(),
            message_type: message_type.to_owned(),
        }),
    )
    .await?;

    let event = RoomEvent::new(workspace_id, NEW_MESSAGE, to_data(&row));
    Ok(Published { row, event })
}

/// Latest messages of a workspace, oldest first.
///
/// # Errors
///
/// `Forbidden` for non-members, `Store` on a failed read.
pub async fn history(state: &AppState, user_id: Uuid, workspace_id: Uuid) -> Result<Vec<MessageRow>, ServiceError> {
    ensure_member(state, workspace_id, user_id).await?;
    let rows = bounded(
        state.config.store_timeout,
        state.messages.list_messages(workspace_id, state.config.message_history_limit),
    )
    .await?;
    Ok(rows)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
