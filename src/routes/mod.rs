//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the WebSocket gateway at `/api/ws` and the
//! request/response surface for chat, tasks, documents, and presence. HTTP
//! mutations publish the same room events as their socket counterparts.

pub mod auth;
pub mod chat;
pub mod documents;
pub mod presence;
pub mod tasks;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::services::RoomEvent;
use crate::services::access::ServiceError;
use crate::store::StoreError;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/ws", get(ws::handle_ws))
        .route(
            "/api/chat/{workspace_id}/messages",
            get(chat::list_messages).post(chat::post_message),
        )
        .route("/api/tasks/{workspace_id}/board", get(tasks::get_board))
        .route("/api/tasks/{workspace_id}/lists", post(tasks::create_list))
        .route("/api/tasks/{workspace_id}/lists/reorder", put(tasks::reorder_lists))
        .route(
            "/api/tasks/{workspace_id}/lists/{list_id}",
            put(tasks::update_list).delete(tasks::delete_list),
        )
        .route("/api/tasks/{workspace_id}/tasks", post(tasks::create_task))
        .route(
            "/api/tasks/{workspace_id}/tasks/{task_id}",
            put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/api/tasks/{workspace_id}/reorder", put(tasks::reorder_tasks))
        .route(
            "/api/documents/{workspace_id}",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/api/documents/{workspace_id}/document/{document_id}",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .route(
            "/api/documents/{workspace_id}/document/{document_id}/snapshot",
            post(documents::save_snapshot),
        )
        .route("/api/presence/update", post(presence::update_status))
        .route("/api/presence/workspace/{workspace_id}", get(presence::workspace_presence))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub(crate) fn service_error_to_status(err: ServiceError) -> StatusCode {
    match err {
        ServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
        ServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Store(e @ StoreError::Database(_)) => {
            tracing::error!(error = %e, "http: store call failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Emit an HTTP-originated event to the whole room.
pub(crate) fn publish(state: &AppState, event: &RoomEvent, user_id: Uuid) {
    state.rooms.emit(event.workspace_id, &event.to_frame(user_id));
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
