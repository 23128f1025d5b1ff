//! WebSocket handler: the real-time event gateway.
//!
//! DESIGN
//! ======
//! On upgrade, verifies the `token` query parameter, generates a connection
//! id, and enters a `select!` loop:
//! - Incoming client frames → parse into a `ClientEvent` → dispatch
//! - Frames queued for this connection by rooms or presence → forward
//!
//! Handler functions validate, mutate state through the services, and
//! return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender, room broadcast, and process-wide broadcast.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `connection_id` and `user_id`
//! 2. Register, announce `online`
//! 3. Frames are handled one at a time, in arrival order
//! 4. Close → teardown (synthetic `peer_left`, leave rooms, `offline`)
//!
//! ERROR HANDLING
//! ==============
//! Malformed frames are dropped with a warning. Events from non-members are
//! dropped with a debug log. Storage failures produce one `error` frame to
//! the sender, correlated by `parent_id`.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{
    ClientEvent, ICE_CANDIDATE, PEER_JOINED, PEER_LEFT, WHITEBOARD_CLEAR, WHITEBOARD_DRAW, WHITEBOARD_UNDO,
};
use crate::frame::{Data, Frame, Status};
use crate::services::access::{ServiceError, ensure_member};
use crate::services::board::TaskDraft;
use crate::services::call::CallEvent;
use crate::services::{RoomEvent, board, chat, document, session};
use crate::state::AppState;
use crate::store::{DocumentPatch, ListPatch, TaskPatch};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// Emit to the whole room, sender included.
    Broadcast(RoomEvent),
    /// Emit to the room except the sender. Used for signaling relays.
    BroadcastExcludeSender(RoomEvent),
    /// Send to every live connection, sender included.
    BroadcastAll(Frame),
    /// Send done+data to sender only.
    Reply(Data),
    /// Nothing to send.
    Silent,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.get("token").map(String::as_str).unwrap_or_default();

    let identity = match state.identity.verify(token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "ws: handshake rejected");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, identity.user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel for frames from rooms and presence.
    let (tx, mut rx) = mpsc::channel::<Frame>(state.config.ws_outbound_buffer);

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("connection_id", connection_id.to_string())
        .with_data("user_id", user_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    session::connect(&state, connection_id, user_id, tx);

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, connection_id, user_id, &text).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    session::teardown(&state, connection_id);
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Keeps transport concerns out of event handling so tests can drive the
/// router with plain strings and observe rooms through mpsc receivers.
async fn process_inbound_text(state: &AppState, connection_id: Uuid, user_id: Uuid, text: &str) -> Vec<Frame> {
    let (req, event) = match ClientEvent::parse_text(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: dropped invalid frame");
            return vec![];
        }
    };

    debug!(%connection_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    match handle_event(state, connection_id, user_id, event).await {
        Ok(Outcome::Broadcast(event)) => {
            state.rooms.emit(event.workspace_id, &event.to_frame(user_id));
            vec![]
        }
        Ok(Outcome::BroadcastExcludeSender(event)) => {
            state
                .rooms
                .emit_except_sender(event.workspace_id, connection_id, &event.to_frame(user_id));
            vec![]
        }
        Ok(Outcome::BroadcastAll(frame)) => {
            state.registry.broadcast_all(&frame, None);
            vec![]
        }
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Silent) => vec![],
        Err(ServiceError::Forbidden { workspace_id }) => {
            debug!(%connection_id, %workspace_id, syscall = %req.syscall, "ws: dropped event from non-member");
            vec![]
        }
        Err(ServiceError::Invalid(reason)) => {
            warn!(%connection_id, syscall = %req.syscall, %reason, "ws: dropped invalid event");
            vec![]
        }
        Err(e @ ServiceError::Store(_)) => {
            warn!(%connection_id, syscall = %req.syscall, error = %e, "ws: store call failed");
            vec![req.error_from(&e)]
        }
    }
}

async fn handle_event(
    state: &AppState,
    connection_id: Uuid,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<Outcome, ServiceError> {
    match event {
        ClientEvent::JoinWorkspace { workspace_id } => {
            session::join_workspace(state, connection_id, user_id, workspace_id).await;
            Ok(Outcome::Silent)
        }
        ClientEvent::LeaveWorkspace { workspace_id } => {
            session::leave_workspace(state, connection_id, workspace_id);
            Ok(Outcome::Silent)
        }
        ClientEvent::SendMessage { workspace_id, content, message_type } => {
            let published = chat::send_message(state, user_id, workspace_id, &content, &message_type).await?;
            Ok(Outcome::Broadcast(published.event))
        }
        ClientEvent::UpdatePresence { status } => {
            let record = state.presence.set_status(user_id, status);
            Ok(Outcome::BroadcastAll(record.to_frame()))
        }
        event @ (ClientEvent::UpdateDocument { .. }
        | ClientEvent::SaveDocumentSnapshot { .. }
        | ClientEvent::DeleteDocument { .. }) => handle_document(state, user_id, event).await,
        event @ (ClientEvent::UserCalling { .. }
        | ClientEvent::PeerJoined { .. }
        | ClientEvent::PeerLeft { .. }
        | ClientEvent::AnswerCall { .. }
        | ClientEvent::RejectCall { .. }
        | ClientEvent::EndCall { .. }
        | ClientEvent::IceCandidate { .. }) => handle_call(state, connection_id, user_id, event).await,
        event @ (ClientEvent::WhiteboardDraw { .. }
        | ClientEvent::WhiteboardClear { .. }
        | ClientEvent::WhiteboardUndo { .. }) => handle_whiteboard(state, user_id, event).await,
        event => handle_board(state, user_id, event).await,
    }
}

// =============================================================================
// DOCUMENT HANDLERS
// =============================================================================

async fn handle_document(state: &AppState, user_id: Uuid, event: ClientEvent) -> Result<Outcome, ServiceError> {
    match event {
        ClientEvent::UpdateDocument { workspace_id, document_id, title, content } => {
            let patch = DocumentPatch { title, content };
            let published = document::update_document(state, user_id, workspace_id, document_id, patch).await?;
            Ok(Outcome::Broadcast(published.event))
        }
        ClientEvent::SaveDocumentSnapshot { workspace_id, document_id, snapshot, content } => {
            document::save_snapshot(state, user_id, workspace_id, document_id, snapshot, content).await?;
            Ok(Outcome::Silent)
        }
        ClientEvent::DeleteDocument { workspace_id, document_id } => {
            let published = document::delete_document(state, user_id, workspace_id, document_id).await?;
            Ok(Outcome::Broadcast(published.event))
        }
        other => Err(unroutable(&other)),
    }
}

// =============================================================================
// BOARD HANDLERS
// =============================================================================

async fn handle_board(state: &AppState, user_id: Uuid, event: ClientEvent) -> Result<Outcome, ServiceError> {
    let published = match event {
        ClientEvent::CreateList { workspace_id, title, position } => {
            board::create_list(state, user_id, workspace_id, &title, position).await?.event
        }
        ClientEvent::UpdateList { workspace_id, list_id, title, position } => {
            board::update_list(state, user_id, workspace_id, list_id, ListPatch { title, position })
                .await?
                .event
        }
        ClientEvent::DeleteList { workspace_id, list_id } => {
            board::delete_list(state, user_id, workspace_id, list_id).await?.event
        }
        ClientEvent::CreateTask { workspace_id, list_id, title, description, position } => {
            let draft = TaskDraft { list_id, title, description, position };
            board::create_task(state, user_id, workspace_id, draft).await?.event
        }
        ClientEvent::UpdateTask {
            workspace_id,
            task_id,
            title,
            description,
            list_id,
            position,
            priority,
            assigned_to,
        } => {
            let patch = TaskPatch { title, description, list_id, position, priority, assigned_to };
            board::update_task(state, user_id, workspace_id, task_id, patch).await?.event
        }
        ClientEvent::DeleteTask { workspace_id, task_id } => {
            board::delete_task(state, user_id, workspace_id, task_id).await?.event
        }
        ClientEvent::ReorderTasks { workspace_id, tasks } => {
            match board::reorder_tasks(state, user_id, workspace_id, tasks).await? {
                (_, Some(event)) => event,
                (_, None) => return Ok(Outcome::Reply(empty_batch("tasks"))),
            }
        }
        ClientEvent::ReorderLists { workspace_id, lists } => {
            match board::reorder_lists(state, user_id, workspace_id, lists).await? {
                (_, Some(event)) => event,
                (_, None) => return Ok(Outcome::Reply(empty_batch("lists"))),
            }
        }
        other => return Err(unroutable(&other)),
    };
    Ok(Outcome::Broadcast(published))
}

fn empty_batch(key: &str) -> Data {
    let mut data = Data::new();
    data.insert(key.into(), serde_json::json!([]));
    data
}

// =============================================================================
// CALL SIGNALING HANDLERS
// =============================================================================

async fn handle_call(
    state: &AppState,
    connection_id: Uuid,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<Outcome, ServiceError> {
    let Some(workspace_id) = event.workspace_id() else {
        return Err(unroutable(&event));
    };
    ensure_member(state, workspace_id, user_id).await?;

    let mut data = Data::new();
    let syscall = match event {
        ClientEvent::UserCalling { peer_id, call_type, .. } => {
            if !state
                .registry
                .admit_call(connection_id, Instant::now(), state.config.call_debounce)
            {
                debug!(%connection_id, %workspace_id, "ws: user_calling debounced");
                return Ok(Outcome::Silent);
            }
            state.calls.apply(workspace_id, connection_id, CallEvent::Calling);
            data.insert("caller_id".into(), serde_json::json!(user_id));
            data.insert("peer_id".into(), serde_json::json!(peer_id));
            data.insert("call_type".into(), serde_json::json!(call_type));
            CallEvent::Calling.outbound_syscall()
        }
        ClientEvent::PeerJoined { peer_id, .. } => {
            state.registry.set_active_peer(connection_id, workspace_id, &peer_id);
            data.insert("user_id".into(), serde_json::json!(user_id));
            data.insert("peer_id".into(), serde_json::json!(peer_id));
            PEER_JOINED
        }
        ClientEvent::PeerLeft { peer_id, .. } => {
            let cleared = state.registry.clear_active_peer(connection_id, workspace_id);
            data.insert("user_id".into(), serde_json::json!(user_id));
            data.insert("peer_id".into(), serde_json::json!(peer_id.or(cleared)));
            PEER_LEFT
        }
        ClientEvent::AnswerCall { peer_id, caller_id, .. } => {
            state.calls.apply(workspace_id, connection_id, CallEvent::Answer);
            data.insert("responder_id".into(), serde_json::json!(user_id));
            data.insert("peer_id".into(), serde_json::json!(peer_id));
            data.insert("caller_id".into(), serde_json::json!(caller_id));
            CallEvent::Answer.outbound_syscall()
        }
        ClientEvent::RejectCall { caller_id, .. } => {
            state.calls.apply(workspace_id, connection_id, CallEvent::Reject);
            data.insert("responder_id".into(), serde_json::json!(user_id));
            data.insert("caller_id".into(), serde_json::json!(caller_id));
            CallEvent::Reject.outbound_syscall()
        }
        ClientEvent::EndCall { .. } => {
            state.calls.apply(workspace_id, connection_id, CallEvent::End);
            data.insert("responder_id".into(), serde_json::json!(user_id));
            CallEvent::End.outbound_syscall()
        }
        ClientEvent::IceCandidate { candidate, target_peer_id, .. } => {
            data.insert("user_id".into(), serde_json::json!(user_id));
            data.insert("candidate".into(), candidate);
            data.insert("target_peer_id".into(), serde_json::json!(target_peer_id));
            ICE_CANDIDATE
        }
        other => return Err(unroutable(&other)),
    };

    Ok(Outcome::BroadcastExcludeSender(RoomEvent::new(workspace_id, syscall, data)))
}

// =============================================================================
// WHITEBOARD HANDLERS
// =============================================================================

async fn handle_whiteboard(state: &AppState, user_id: Uuid, event: ClientEvent) -> Result<Outcome, ServiceError> {
    let Some(workspace_id) = event.workspace_id() else {
        return Err(unroutable(&event));
    };
    ensure_member(state, workspace_id, user_id).await?;

    let mut data = Data::new();
    data.insert("user_id".into(), serde_json::json!(user_id));
    let syscall = match event {
        ClientEvent::WhiteboardDraw { line, .. } => {
            data.insert("line".into(), line);
            WHITEBOARD_DRAW
        }
        ClientEvent::WhiteboardClear { .. } => WHITEBOARD_CLEAR,
        ClientEvent::WhiteboardUndo { lines, .. } => {
            data.insert("lines".into(), lines);
            WHITEBOARD_UNDO
        }
        other => return Err(unroutable(&other)),
    };

    Ok(Outcome::BroadcastExcludeSender(RoomEvent::new(workspace_id, syscall, data)))
}

fn unroutable(event: &ClientEvent) -> ServiceError {
    ServiceError::Invalid(format!("event routed to wrong handler: {event:?}"))
}

// =============================================================================
// TRANSPORT
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
