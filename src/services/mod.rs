//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic, membership checks, and calls into the
//! data layer so route handlers can stay focused on protocol translation and
//! auth plumbing. A successful write returns the persisted row together with
//! the `RoomEvent` it produces; the socket router and the HTTP handlers both
//! publish that same event, so the two surfaces stay in lockstep.

pub mod access;
pub mod board;
pub mod call;
pub mod chat;
pub mod document;
pub mod identity;
pub mod positions;
pub mod presence;
pub mod registry;
pub mod room;
pub mod session;

use uuid::Uuid;

use crate::frame::{Data, Frame};

/// Room-scoped notification produced by a successful write.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub workspace_id: Uuid,
    pub syscall: &'static str,
    pub data: Data,
}

impl RoomEvent {
    #[must_use]
    pub fn new(workspace_id: Uuid, syscall: &'static str, data: Data) -> Self {
        Self { workspace_id, syscall, data }
    }

    /// Outbound frame, stamped with the acting user.
    #[must_use]
    pub fn to_frame(&self, from: Uuid) -> Frame {
        Frame::request(self.syscall, self.data.clone())
            .with_workspace_id(self.workspace_id)
            .with_from(from.to_string())
    }
}

/// Persisted row plus the room event its write produced.
#[derive(Debug, Clone)]
pub struct Published<T> {
    pub row: T,
    pub event: RoomEvent,
}
