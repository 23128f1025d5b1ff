use super::*;
use crate::services::call::CallState;
use crate::state::test_helpers::{self, TestConnection, assert_no_frame, recv_frame};
use crate::store::memory::MemoryStore;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite;

fn request_text(workspace_id: Uuid, syscall: &str, data: serde_json::Value) -> String {
    json!({ "syscall": syscall, "workspace_id": workspace_id, "data": data }).to_string()
}

async fn send(state: &AppState, conn: &TestConnection, text: &str) -> Vec<Frame> {
    process_inbound_text(state, conn.connection_id, conn.user_id, text).await
}

async fn join(state: &AppState, conn: &TestConnection, workspace_id: Uuid) {
    let replies = send(state, conn, &request_text(workspace_id, "join_workspace", json!({}))).await;
    assert!(replies.is_empty());
    assert!(state.rooms.is_member(workspace_id, conn.connection_id));
}

fn two_joined_members(state: &AppState, store: &MemoryStore, workspace_id: Uuid) -> (TestConnection, TestConnection) {
    (
        test_helpers::connect_member(state, store, "ada", workspace_id),
        test_helpers::connect_member(state, store, "bob", workspace_id),
    )
}

// =============================================================================
// ROOM DELIVERY
// =============================================================================

#[tokio::test]
async fn send_message_reaches_room_with_sender_identity() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    let replies = send(&state, &ada, &request_text(ws, "send_message", json!({ "content": "hi" }))).await;
    assert!(replies.is_empty());

    for rx in [&mut bob.rx, &mut ada.rx] {
        let frame = recv_frame(rx).await;
        assert_eq!(frame.syscall, "new_message");
        assert_eq!(frame.workspace_id, Some(ws));
        assert_eq!(frame.from.as_deref(), Some(ada.user_id.to_string().as_str()));
        assert_eq!(frame.data.get("content"), Some(&json!("hi")));
        assert_eq!(frame.data.get("sender_id"), Some(&json!(ada.user_id)));
    }
    assert_eq!(store.message_count(), 1);
}

#[tokio::test]
async fn member_who_has_not_joined_receives_nothing() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;

    send(&state, &ada, &request_text(ws, "send_message", json!({ "content": "hi" }))).await;

    assert_no_frame(&mut bob.rx).await;
}

#[tokio::test]
async fn leave_stops_delivery() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    send(&state, &bob, &request_text(ws, "leave_workspace", json!({}))).await;
    send(&state, &ada, &request_text(ws, "send_message", json!({ "content": "hi" }))).await;

    assert!(!state.rooms.is_member(ws, bob.connection_id));
    assert_no_frame(&mut bob.rx).await;
}

#[tokio::test]
async fn events_from_non_members_are_dropped() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let mut ada = test_helpers::connect_member(&state, &store, "ada", ws);
    join(&state, &ada, ws).await;
    let eve_id = store.add_user("eve", "t-eve");
    let mut eve = test_helpers::connect_user(&state, eve_id);

    let join_replies = send(&state, &eve, &request_text(ws, "join_workspace", json!({}))).await;
    let msg_replies = send(&state, &eve, &request_text(ws, "send_message", json!({ "content": "spam" }))).await;
    let draw_replies = send(&state, &eve, &request_text(ws, "whiteboard_draw", json!({ "line": [1, 2] }))).await;

    assert!(join_replies.is_empty() && msg_replies.is_empty() && draw_replies.is_empty());
    assert!(!state.rooms.is_member(ws, eve.connection_id));
    assert_eq!(store.message_count(), 0);
    assert_no_frame(&mut ada.rx).await;
    assert_no_frame(&mut eve.rx).await;
}

#[tokio::test]
async fn board_mutation_broadcasts_to_room() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    send(&state, &ada, &request_text(ws, "create_list", json!({ "title": "Todo", "position": 0 }))).await;

    let created = recv_frame(&mut bob.rx).await;
    assert_eq!(created.syscall, "list_created");
    assert_eq!(created.data.get("title"), Some(&json!("Todo")));
    let list_id: Uuid = serde_json::from_value(created.data["id"].clone()).expect("list id");
    assert!(store.list(list_id).is_some());
}

// =============================================================================
// SIGNALING RELAYS
// =============================================================================

#[tokio::test]
async fn user_calling_is_debounced_per_connection() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    let calling = request_text(ws, "user_calling", json!({ "peer_id": "peer-ada", "call_type": "video" }));
    send(&state, &ada, &calling).await;
    send(&state, &ada, &calling).await;

    let frame = recv_frame(&mut bob.rx).await;
    assert_eq!(frame.syscall, "user_calling");
    assert_eq!(frame.data.get("caller_id"), Some(&json!(ada.user_id)));
    assert_eq!(frame.data.get("peer_id"), Some(&json!("peer-ada")));
    assert_eq!(frame.data.get("call_type"), Some(&json!("video")));
    assert_no_frame(&mut bob.rx).await;
    assert_no_frame(&mut ada.rx).await;
}

#[tokio::test]
async fn call_replies_are_relayed_and_tracked() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    let answer = json!({ "peer_id": "peer-bob", "caller_id": ada.user_id });
    send(&state, &bob, &request_text(ws, "answer_call", answer)).await;

    let frame = recv_frame(&mut ada.rx).await;
    assert_eq!(frame.syscall, "call_answered");
    assert_eq!(frame.data.get("responder_id"), Some(&json!(bob.user_id)));
    assert_eq!(frame.data.get("caller_id"), Some(&json!(ada.user_id)));
    assert_eq!(state.calls.state(ws, bob.connection_id), CallState::Answered);

    send(&state, &bob, &request_text(ws, "end_call", json!({}))).await;
    assert_eq!(recv_frame(&mut ada.rx).await.syscall, "call_ended");
    assert_eq!(state.calls.state(ws, bob.connection_id), CallState::Ended);
    assert_no_frame(&mut bob.rx).await;
}

#[tokio::test]
async fn reply_moves_only_the_responders_side() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    let calling = request_text(ws, "user_calling", json!({ "peer_id": "peer-ada", "call_type": "audio" }));
    send(&state, &ada, &calling).await;
    assert_eq!(recv_frame(&mut bob.rx).await.syscall, "user_calling");

    let answer = json!({ "peer_id": "peer-bob", "caller_id": ada.user_id });
    send(&state, &bob, &request_text(ws, "answer_call", answer)).await;
    assert_eq!(recv_frame(&mut ada.rx).await.syscall, "call_answered");

    assert_eq!(state.calls.state(ws, bob.connection_id), CallState::Answered);
    assert_eq!(state.calls.state(ws, ada.connection_id), CallState::Ringing);

    send(&state, &ada, &request_text(ws, "end_call", json!({}))).await;
    assert_eq!(recv_frame(&mut bob.rx).await.syscall, "call_ended");
    assert_eq!(state.calls.state(ws, ada.connection_id), CallState::Ended);
    assert_eq!(state.calls.state(ws, bob.connection_id), CallState::Answered);
}

#[tokio::test]
async fn peer_left_without_id_uses_tracked_peer() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    send(&state, &ada, &request_text(ws, "peer_joined", json!({ "peer_id": "peer-ada" }))).await;
    assert_eq!(recv_frame(&mut bob.rx).await.syscall, "peer_joined");
    assert_eq!(state.registry.active_peer(ada.connection_id, ws).as_deref(), Some("peer-ada"));

    send(&state, &ada, &request_text(ws, "peer_left", json!({}))).await;
    let left = recv_frame(&mut bob.rx).await;
    assert_eq!(left.syscall, "peer_left");
    assert_eq!(left.data.get("peer_id"), Some(&json!("peer-ada")));
    assert_eq!(state.registry.active_peer(ada.connection_id, ws), None);
}

#[tokio::test]
async fn ice_candidate_and_whiteboard_relay_payloads() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;

    let candidate = json!({ "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 54400 typ host" });
    let ice = json!({ "candidate": candidate, "target_peer_id": "peer-bob" });
    send(&state, &ada, &request_text(ws, "ice_candidate", ice)).await;
    let frame = recv_frame(&mut bob.rx).await;
    assert_eq!(frame.syscall, "ice_candidate");
    assert_eq!(frame.data.get("candidate"), Some(&candidate));
    assert_eq!(frame.data.get("target_peer_id"), Some(&json!("peer-bob")));

    let line = json!({ "points": [0, 0, 10, 10], "color": "#000" });
    send(&state, &ada, &request_text(ws, "whiteboard_draw", json!({ "line": line }))).await;
    let frame = recv_frame(&mut bob.rx).await;
    assert_eq!(frame.syscall, "whiteboard_draw");
    assert_eq!(frame.data.get("line"), Some(&line));

    send(&state, &ada, &request_text(ws, "whiteboard_clear", json!({}))).await;
    assert_eq!(recv_frame(&mut bob.rx).await.syscall, "whiteboard_clear");
    assert_no_frame(&mut ada.rx).await;
}

// =============================================================================
// REPLIES AND ERRORS
// =============================================================================

#[tokio::test]
async fn empty_reorder_replies_done_without_store_calls() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;
    let calls_before = store.calls();

    let replies = send(&state, &ada, &request_text(ws, "reorder_tasks", json!({ "tasks": [] }))).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].data.get("tasks"), Some(&json!([])));
    assert_eq!(store.calls(), calls_before);
    assert_no_frame(&mut bob.rx).await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_reply() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let ada = test_helpers::connect_member(&state, &store, "ada", ws);

    assert!(send(&state, &ada, "not json").await.is_empty());
    assert!(send(&state, &ada, &request_text(ws, "drop_tables", json!({}))).await.is_empty());
    assert!(send(&state, &ada, &request_text(ws, "send_message", json!({}))).await.is_empty());
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn store_timeout_replies_retryable_error_to_sender() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (ada, mut bob) = two_joined_members(&state, &store, ws);
    join(&state, &ada, ws).await;
    join(&state, &bob, ws).await;
    store.stall_for(Duration::from_secs(5));

    let request_id = Uuid::new_v4();
    let text = json!({
        "id": request_id,
        "syscall": "send_message",
        "workspace_id": ws,
        "data": { "content": "hi" },
    })
    .to_string();
    let replies = send(&state, &ada, &text).await;

    assert_eq!(replies.len(), 1);
    let err = &replies[0];
    assert_eq!(err.status, Status::Error);
    assert_eq!(err.parent_id, Some(request_id));
    assert_eq!(err.data.get("code"), Some(&json!("E_STORE_TIMEOUT")));
    assert_eq!(err.data.get("retryable"), Some(&json!(true)));
    assert_no_frame(&mut bob.rx).await;
}

#[tokio::test]
async fn update_presence_reaches_every_connection() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let (mut ada, mut bob) = two_joined_members(&state, &store, ws);

    let text = json!({ "syscall": "update_presence", "data": { "status": "away" } }).to_string();
    send(&state, &ada, &text).await;

    for rx in [&mut ada.rx, &mut bob.rx] {
        let frame = recv_frame(rx).await;
        assert_eq!(frame.syscall, "presence_update");
        assert_eq!(frame.data.get("status"), Some(&json!("away")));
        assert_eq!(frame.data.get("user_id"), Some(&json!(ada.user_id)));
    }
}

// =============================================================================
// SOCKET
// =============================================================================

async fn serve(state: AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, crate::routes::app(state)).await.expect("serve");
    });
    addr
}

async fn next_frame<S>(stream: &mut S) -> Frame
where
    S: futures::Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("socket receive timed out")
            .expect("socket closed")
            .expect("socket error");
        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

#[tokio::test]
async fn socket_session_round_trip() {
    let (state, store) = test_helpers::test_app_state();
    let ws = Uuid::new_v4();
    let user_id = store.add_user("ada", "tok-ada");
    store.add_member(ws, user_id);
    let addr = serve(state.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?token=tok-ada"))
        .await
        .expect("connect");

    let welcome = next_frame(&mut socket).await;
    assert_eq!(welcome.syscall, "session:connected");
    assert_eq!(welcome.data.get("user_id"), Some(&json!(user_id.to_string())));
    let online = next_frame(&mut socket).await;
    assert_eq!(online.syscall, "presence_update");
    assert_eq!(online.data.get("status"), Some(&json!("online")));

    for text in [
        request_text(ws, "join_workspace", json!({})),
        request_text(ws, "send_message", json!({ "content": "hello" })),
    ] {
        socket.send(tungstenite::Message::text(text)).await.expect("send");
    }

    let message = next_frame(&mut socket).await;
    assert_eq!(message.syscall, "new_message");
    assert_eq!(message.data.get("content"), Some(&json!("hello")));

    socket.close(None).await.expect("close");
    timeout(Duration::from_secs(2), async {
        while !state.registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection torn down");
    assert_eq!(state.presence.get(user_id).map(|r| r.status.to_string()).as_deref(), Some("offline"));
}

#[tokio::test]
async fn handshake_with_bad_token_is_unauthorized() {
    let (state, _store) = test_helpers::test_app_state();
    let addr = serve(state).await;

    for url in [format!("ws://{addr}/api/ws?token=nope"), format!("ws://{addr}/api/ws")] {
        let err = tokio_tungstenite::connect_async(url).await.expect_err("handshake should fail");
        match err {
            tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[tokio::test]
async fn handshake_accepts_account_service_jwt() {
    use crate::services::identity::JwtVerifier;
    use crate::state::Backends;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::sync::Arc;

    let config = test_helpers::test_config();
    let store = Arc::new(MemoryStore::new());
    let backends = Backends {
        identity: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        membership: store.clone(),
        messages: store.clone(),
        documents: store.clone(),
        board: store,
    };
    let user_id = Uuid::new_v4();
    let claims = json!({ "id": user_id, "email": "ada@example.com", "iat": 1_700_000_000 });
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(config.jwt_secret.as_bytes()))
        .expect("sign token");
    let addr = serve(AppState::new(config, backends)).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?token={token}"))
        .await
        .expect("connect");

    let welcome = next_frame(&mut socket).await;
    assert_eq!(welcome.syscall, "session:connected");
    assert_eq!(welcome.data.get("user_id"), Some(&json!(user_id.to_string())));
}
