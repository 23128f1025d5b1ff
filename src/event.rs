//! Typed inbound events.
//!
//! DESIGN
//! ======
//! A socket frame names its event in `syscall` and carries the payload in
//! `data`. `ClientEvent` is the closed set of events the gateway accepts;
//! anything else (unknown syscall, missing or mistyped field) is an
//! `EventError` and the frame is dropped.
//!
//! A room-scoped payload may omit `workspace_id` when the frame envelope
//! carries it; the envelope value fills the gap.

use serde::Deserialize;
use uuid::Uuid;

use crate::frame::Frame;
use crate::services::presence::PresenceStatus;
use crate::store::{ListPosition, TaskPosition};

// =============================================================================
// OUTBOUND NAMES
// =============================================================================

pub const NEW_MESSAGE: &str = "new_message";
pub const DOCUMENT_CREATED: &str = "document_created";
pub const DOCUMENT_UPDATED: &str = "document_updated";
pub const DOCUMENT_DELETED: &str = "document_deleted";
pub const LIST_CREATED: &str = "list_created";
pub const LIST_UPDATED: &str = "list_updated";
pub const LIST_DELETED: &str = "list_deleted";
pub const TASK_CREATED: &str = "task_created";
pub const TASK_UPDATED: &str = "task_updated";
pub const TASK_DELETED: &str = "task_deleted";
pub const TASKS_REORDERED: &str = "tasks_reordered";
pub const LISTS_REORDERED: &str = "lists_reordered";
pub const PEER_JOINED: &str = "peer_joined";
pub const PEER_LEFT: &str = "peer_left";
pub const ICE_CANDIDATE: &str = "ice_candidate";
pub const WHITEBOARD_DRAW: &str = "whiteboard_draw";
pub const WHITEBOARD_CLEAR: &str = "whiteboard_clear";
pub const WHITEBOARD_UNDO: &str = "whiteboard_undo";

/// Every syscall a client may send.
pub const INBOUND_SYSCALLS: &[&str] = &[
    "join_workspace",
    "leave_workspace",
    "send_message",
    "update_document",
    "save_document_snapshot",
    "delete_document",
    "create_list",
    "update_list",
    "delete_list",
    "create_task",
    "update_task",
    "delete_task",
    "reorder_tasks",
    "reorder_lists",
    "user_calling",
    "peer_joined",
    "peer_left",
    "answer_call",
    "reject_call",
    "end_call",
    "ice_candidate",
    "whiteboard_draw",
    "whiteboard_clear",
    "whiteboard_undo",
    "update_presence",
];

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid json: {0}")]
    Json(serde_json::Error),
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("invalid payload for {syscall}: {source}")]
    Payload {
        syscall: String,
        #[source]
        source: serde_json::Error,
    },
}

impl crate::frame::ErrorCode for EventError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "E_INVALID_JSON",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::Payload { .. } => "E_INVALID_PAYLOAD",
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

fn default_message_type() -> String {
    "text".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "syscall", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinWorkspace {
        workspace_id: Uuid,
    },
    LeaveWorkspace {
        workspace_id: Uuid,
    },
    SendMessage {
        workspace_id: Uuid,
        content: String,
        #[serde(default = "default_message_type")]
        message_type: String,
    },
    UpdateDocument {
        workspace_id: Uuid,
        document_id: Uuid,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    SaveDocumentSnapshot {
        workspace_id: Uuid,
        document_id: Uuid,
        /// Opaque sync-protocol state as a byte array.
        snapshot: Vec<u8>,
        #[serde(default)]
        content: String,
    },
    DeleteDocument {
        workspace_id: Uuid,
        document_id: Uuid,
    },
    CreateList {
        workspace_id: Uuid,
        title: String,
        #[serde(default)]
        position: i32,
    },
    UpdateList {
        workspace_id: Uuid,
        list_id: Uuid,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        position: Option<i32>,
    },
    DeleteList {
        workspace_id: Uuid,
        list_id: Uuid,
    },
    CreateTask {
        workspace_id: Uuid,
        list_id: Uuid,
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        position: i32,
    },
    UpdateTask {
        workspace_id: Uuid,
        task_id: Uuid,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        list_id: Option<Uuid>,
        #[serde(default)]
        position: Option<i32>,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default)]
        assigned_to: Option<Uuid>,
    },
    DeleteTask {
        workspace_id: Uuid,
        task_id: Uuid,
    },
    ReorderTasks {
        workspace_id: Uuid,
        tasks: Vec<TaskPosition>,
    },
    ReorderLists {
        workspace_id: Uuid,
        lists: Vec<ListPosition>,
    },
    UserCalling {
        workspace_id: Uuid,
        peer_id: String,
        #[serde(default)]
        call_type: Option<String>,
    },
    PeerJoined {
        workspace_id: Uuid,
        peer_id: String,
    },
    PeerLeft {
        workspace_id: Uuid,
        #[serde(default)]
        peer_id: Option<String>,
    },
    AnswerCall {
        workspace_id: Uuid,
        #[serde(default)]
        peer_id: Option<String>,
        #[serde(default)]
        caller_id: Option<Uuid>,
    },
    RejectCall {
        workspace_id: Uuid,
        #[serde(default)]
        caller_id: Option<Uuid>,
    },
    EndCall {
        workspace_id: Uuid,
    },
    IceCandidate {
        workspace_id: Uuid,
        candidate: serde_json::Value,
        target_peer_id: String,
    },
    WhiteboardDraw {
        workspace_id: Uuid,
        line: serde_json::Value,
    },
    WhiteboardClear {
        workspace_id: Uuid,
    },
    WhiteboardUndo {
        workspace_id: Uuid,
        #[serde(default)]
        lines: serde_json::Value,
    },
    UpdatePresence {
        status: PresenceStatus,
    },
}

impl ClientEvent {
    /// Parse raw socket text into a frame and its typed event.
    ///
    /// # Errors
    ///
    /// Returns `EventError` for bad JSON, an unknown syscall, or a payload
    /// that does not match the event's shape.
    pub fn parse_text(text: &str) -> Result<(Frame, Self), EventError> {
        let frame: Frame = serde_json::from_str(text).map_err(EventError::Json)?;
        let event = Self::from_frame(&frame)?;
        Ok((frame, event))
    }

    /// Type the payload of an already-decoded frame.
    ///
    /// # Errors
    ///
    /// See [`ClientEvent::parse_text`].
    pub fn from_frame(frame: &Frame) -> Result<Self, EventError> {
        if !INBOUND_SYSCALLS.contains(&frame.syscall.as_str()) {
            return Err(EventError::UnknownSyscall(frame.syscall.clone()));
        }

        let mut data: serde_json::Map<String, serde_json::Value> =
            frame.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if let Some(workspace_id) = frame.workspace_id {
            data.entry("workspace_id")
                .or_insert_with(|| serde_json::Value::String(workspace_id.to_string()));
        }

        let tagged = serde_json::json!({ "syscall": frame.syscall, "data": data });
        serde_json::from_value(tagged).map_err(|source| EventError::Payload { syscall: frame.syscall.clone(), source })
    }

    /// Workspace the event is scoped to, if any.
    #[must_use]
    pub fn workspace_id(&self) -> Option<Uuid> {
        match self {
            Self::JoinWorkspace { workspace_id }
            | Self::LeaveWorkspace { workspace_id }
            | Self::SendMessage { workspace_id, .. }
            | Self::UpdateDocument { workspace_id, .. }
            | Self::SaveDocumentSnapshot { workspace_id, .. }
            | Self::DeleteDocument { workspace_id, .. }
            | Self::CreateList { workspace_id, .. }
            | Self::UpdateList { workspace_id, .. }
            | Self::DeleteList { workspace_id, .. }
            | Self::CreateTask { workspace_id, .. }
            | Self::UpdateTask { workspace_id, .. }
            | Self::DeleteTask { workspace_id, .. }
            | Self::ReorderTasks { workspace_id, .. }
            | Self::ReorderLists { workspace_id, .. }
            | Self::UserCalling { workspace_id, .. }
            | Self::PeerJoined { workspace_id, .. }
            | Self::PeerLeft { workspace_id, .. }
            | Self::AnswerCall { workspace_id, .. }
            | Self::RejectCall { workspace_id, .. }
            | Self::EndCall { workspace_id }
            | Self::IceCandidate { workspace_id, .. }
            | Self::WhiteboardDraw { workspace_id, .. }
            | Self::WhiteboardClear { workspace_id }
            | Self::WhiteboardUndo { workspace_id, .. } => Some(*workspace_id),
            Self::UpdatePresence { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
