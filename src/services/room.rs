//! Room broadcaster: per-workspace fan-out groups.
//!
//! DESIGN
//! ======
//! One room per workspace, named `workspace_<uuid>`. A room is just the set
//! of member connections and their outbound channels; it is created on first
//! join and pruned when the last member leaves. There is no backlog: a late
//! joiner only sees frames emitted after it joined.
//!
//! Delivery is best-effort per connection. A full channel drops that frame
//! for that connection only, and never blocks the emitter.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::frame::Frame;

/// Deterministic room name for a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workspace_{}", self.0)
    }
}

#[derive(Default)]
pub struct RoomBroadcaster {
    rooms: DashMap<Uuid, HashMap<Uuid, mpsc::Sender<Frame>>>,
}

impl RoomBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a workspace room. Idempotent; returns true only
    /// when the connection was not already a member.
    pub fn join(&self, workspace_id: Uuid, connection_id: Uuid, tx: mpsc::Sender<Frame>) -> bool {
        self.rooms
            .entry(workspace_id)
            .or_default()
            .insert(connection_id, tx)
            .is_none()
    }

    /// Remove a connection from a room. Idempotent; prunes the room when it
    /// becomes empty.
    pub fn leave(&self, workspace_id: Uuid, connection_id: Uuid) -> bool {
        let removed = self
            .rooms
            .get_mut(&workspace_id)
            .is_some_and(|mut members| members.remove(&connection_id).is_some());
        self.rooms.remove_if(&workspace_id, |_, members| members.is_empty());
        removed
    }

    #[must_use]
    pub fn is_member(&self, workspace_id: Uuid, connection_id: Uuid) -> bool {
        self.rooms
            .get(&workspace_id)
            .is_some_and(|members| members.contains_key(&connection_id))
    }

    #[must_use]
    pub fn member_count(&self, workspace_id: Uuid) -> usize {
        self.rooms.get(&workspace_id).map_or(0, |members| members.len())
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Send to every member of the room. Returns how many channels accepted it.
    pub fn emit(&self, workspace_id: Uuid, frame: &Frame) -> usize {
        self.send(workspace_id, frame, None)
    }

    /// Send to every member of the room except the originating connection.
    pub fn emit_except_sender(&self, workspace_id: Uuid, sender: Uuid, frame: &Frame) -> usize {
        self.send(workspace_id, frame, Some(sender))
    }

    fn send(&self, workspace_id: Uuid, frame: &Frame, exclude: Option<Uuid>) -> usize {
        // Clone targets under the shard guard, send after it is released.
        let targets: Vec<mpsc::Sender<Frame>> = match self.rooms.get(&workspace_id) {
            Some(members) => members
                .iter()
                .filter(|(connection_id, _)| exclude != Some(**connection_id))
                .map(|(_, tx)| tx.clone())
                .collect(),
            None => return 0,
        };

        let delivered = targets
            .iter()
            .filter(|tx| tx.try_send(frame.clone()).is_ok())
            .count();
        if delivered < targets.len() {
            tracing::debug!(room = %RoomId(workspace_id), dropped = targets.len() - delivered, "room: frame dropped for slow members");
        }
        delivered
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
