//! Session lifecycle: connect, room membership, teardown.
//!
//! DESIGN
//! ======
//! These functions coordinate the registries so that each one stays a plain
//! data structure. Ordering matters on both ends:
//!
//! - connect: register first, then announce `online` to every connection
//!   (the new one included).
//! - teardown: claim the connection, notify peers with one synthetic
//!   `peer_left` per tracked workspace, leave rooms, drop call sessions,
//!   announce `offline` to everyone else, and only then remove the
//!   registry entry.
//!
//! Teardown is idempotent: the registry hands out its snapshot once.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::{ServiceError, ensure_member};
use super::presence::{PresenceRecord, PresenceStatus};
use crate::event::PEER_LEFT;
use crate::frame::{Data, Frame};
use crate::state::AppState;

/// Register a freshly authenticated connection and announce it online.
pub fn connect(state: &AppState, connection_id: Uuid, user_id: Uuid, tx: mpsc::Sender<Frame>) -> PresenceRecord {
    state.registry.register(connection_id, user_id, tx);
    let record = state.presence.set_status(user_id, PresenceStatus::Online);
    state.registry.broadcast_all(&record.to_frame(), None);
    info!(%connection_id, %user_id, "session: connected");
    record
}

/// Join a workspace room after the membership check. Non-members and
/// oracle failures are refused silently; returns whether the connection is
/// now in the room.
pub async fn join_workspace(state: &AppState, connection_id: Uuid, user_id: Uuid, workspace_id: Uuid) -> bool {
    match ensure_member(state, workspace_id, user_id).await {
        Ok(()) => {}
        Err(ServiceError::Forbidden { .. }) => {
            debug!(%connection_id, %workspace_id, "session: join refused, not a member");
            return false;
        }
        Err(e) => {
            warn!(%connection_id, %workspace_id, error = %e, "session: join refused, membership check failed");
            return false;
        }
    }

    let Some(tx) = state.registry.sender(connection_id) else {
        return false;
    };
    if !state.registry.add_room(connection_id, workspace_id) {
        return false;
    }
    state.rooms.join(workspace_id, connection_id, tx);

    // Teardown may have claimed the connection while the oracle was answering.
    if state.registry.sender(connection_id).is_none() {
        state.rooms.leave(workspace_id, connection_id);
        return false;
    }

    debug!(%connection_id, %workspace_id, "session: joined workspace");
    true
}

/// Leave a workspace room. Idempotent.
pub fn leave_workspace(state: &AppState, connection_id: Uuid, workspace_id: Uuid) {
    state.registry.remove_room(connection_id, workspace_id);
    if state.rooms.leave(workspace_id, connection_id) {
        debug!(%connection_id, %workspace_id, "session: left workspace");
    }
}

/// Tear a connection down. Returns false if it was already torn down.
pub fn teardown(state: &AppState, connection_id: Uuid) -> bool {
    let Some(snapshot) = state.registry.begin_teardown(connection_id) else {
        return false;
    };
    let user_id = snapshot.user_id;

    for (workspace_id, peer_id) in &snapshot.active_peers {
        let mut data = Data::new();
        data.insert("peer_id".into(), serde_json::json!(peer_id));
        data.insert("user_id".into(), serde_json::json!(user_id));
        let frame = Frame::request(PEER_LEFT, data)
            .with_workspace_id(*workspace_id)
            .with_from(user_id.to_string());
        state.rooms.emit_except_sender(*workspace_id, connection_id, &frame);
    }

    for workspace_id in &snapshot.rooms {
        state.rooms.leave(*workspace_id, connection_id);
    }
    state.calls.clear_connection(connection_id);

    let record = state.presence.set_status(user_id, PresenceStatus::Offline);
    state.registry.broadcast_all(&record.to_frame(), Some(connection_id));

    state.registry.remove(connection_id);
    info!(
        %connection_id,
        %user_id,
        rooms = snapshot.rooms.len(),
        live = state.registry.len(),
        open_rooms = state.rooms.room_count(),
        call_sessions = state.calls.len(),
        "session: disconnected"
    );
    true
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
