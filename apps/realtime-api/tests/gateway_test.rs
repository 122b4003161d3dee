mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use praseodym_common::RoomId;
use realtime_api::config::Config;
use realtime_api::gateway::events::PresenceStatus;
use serde_json::json;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tungstenite::protocol::frame::coding::CloseCode;

/// Read until the server closes the socket and return the close code.
async fn expect_close(ws: &mut common::WsStream) -> Option<CloseCode> {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close");
        match msg {
            Some(Ok(tungstenite::Message::Close(frame))) => return frame.map(|f| f.code),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_token_is_admitted_and_announced_online() {
    let (addr, state, directory) = common::start_ws_server().await;

    let mut ws = common::connect_as(addr, &state, "alice").await;
    assert!(state.gateway.is_online("alice"));
    assert_eq!(state.gateway.connection_count(), 1);

    // The new connection is itself a recipient of the global presence event.
    let status = common::next_event(&mut ws, "userStatus").await;
    assert_eq!(status["data"], json!({ "userId": "alice", "status": "online" }));

    common::wait_until(|| !directory.presence_writes().is_empty()).await;
    let write = &directory.presence_writes()[0];
    assert_eq!(write.user_id, "alice");
    assert_eq!(write.status, PresenceStatus::Online);
}

#[tokio::test]
async fn expired_token_is_refused() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let token = common::mint_expired_token("alice");
    let mut ws = common::connect_with_frame(addr, json!({ "auth": { "token": token } })).await;

    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4004)));
    assert_eq!(state.gateway.connection_count(), 0);
    assert!(!state.gateway.is_online("alice"));
}

#[tokio::test]
async fn missing_token_is_refused() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let mut ws = common::connect_with_frame(addr, json!({ "auth": {} })).await;
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4004)));
    assert_eq!(state.gateway.connection_count(), 0);
}

#[tokio::test]
async fn unknown_user_is_refused() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let token = common::mint_token("mallory");
    let mut ws = common::connect_with_frame(addr, json!({ "auth": { "token": token } })).await;
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4004)));
    assert_eq!(state.gateway.connection_count(), 0);
}

#[tokio::test]
async fn forged_token_is_refused() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &common::TestClaims {
            id: "alice".to_string(),
            iat: chrono::Utc::now().timestamp(),
            exp: chrono::Utc::now().timestamp() + 300,
        },
        &jsonwebtoken::EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let mut ws = common::connect_with_frame(addr, json!({ "auth": { "token": token } })).await;
    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4004)));
    assert_eq!(state.gateway.connection_count(), 0);
}

#[tokio::test]
async fn handshake_timeout_closes_socket() {
    let mut config = Config::for_testing(common::TEST_JWT_SECRET, common::TEST_INTERNAL_KEY);
    config.handshake_timeout = Duration::from_millis(100);
    let (addr, state, _directory) = common::start_ws_server_with(config).await;

    let url = format!("ws://{addr}/socket");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4009)));
    assert_eq!(state.gateway.connection_count(), 0);
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_client_is_closed_after_idle_timeout() {
    let mut config = Config::for_testing(common::TEST_JWT_SECRET, common::TEST_INTERNAL_KEY);
    config.ping_interval = Duration::from_millis(50);
    config.idle_timeout = Duration::from_millis(150);
    let (addr, state, directory) = common::start_ws_server_with(config).await;

    // Never read, so the client never answers pings.
    let mut ws = common::connect_as(addr, &state, "alice").await;
    common::wait_until(|| state.gateway.connection_count() == 0).await;
    assert!(!state.gateway.is_online("alice"));

    assert_eq!(expect_close(&mut ws).await, Some(CloseCode::from(4010)));

    let offline_writes = || {
        directory
            .presence_writes()
            .iter()
            .filter(|w| w.user_id == "alice" && w.status == PresenceStatus::Offline)
            .count()
    };
    common::wait_until(|| offline_writes() > 0).await;
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(offline_writes(), 1);
}

#[tokio::test]
async fn zero_ping_interval_does_not_break_connections() {
    let mut config = Config::for_testing(common::TEST_JWT_SECRET, common::TEST_INTERNAL_KEY);
    config.ping_interval = Duration::ZERO;
    let (addr, state, _directory) = common::start_ws_server_with(config).await;

    let mut ws = common::connect_as(addr, &state, "alice").await;
    let status = common::next_event(&mut ws, "userStatus").await;
    assert_eq!(status["data"]["status"], "online");

    ws.close(None).await.unwrap();
    common::wait_until(|| state.gateway.connection_count() == 0).await;
    assert!(!state.gateway.is_online("alice"));
}

// ---------------------------------------------------------------------------
// Rooms and fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn joined_channel_receives_new_message() {
    let (addr, state, _directory) = common::start_ws_server().await;
    let general = RoomId::channel("general");

    let mut alice = common::connect_as(addr, &state, "alice").await;
    let mut bob = common::connect_as(addr, &state, "bob").await;
    common::send_event(&mut alice, "joinChannel", json!("general")).await;
    common::wait_until(|| state.gateway.members_of(&general).len() == 1).await;

    let delivered = state
        .gateway
        .publish_new_message("general", json!({ "_id": "m1", "content": "hello" }));
    assert_eq!(delivered, 1);

    let msg = common::next_event(&mut alice, "newMessage").await;
    assert_eq!(msg["data"]["content"], "hello");
    common::assert_no_event(&mut bob, "newMessage").await;
}

#[tokio::test]
async fn left_channel_stops_receiving() {
    let (addr, state, _directory) = common::start_ws_server().await;
    let general = RoomId::channel("general");

    let mut alice = common::connect_as(addr, &state, "alice").await;
    common::send_event(&mut alice, "joinChannel", json!("general")).await;
    common::wait_until(|| state.gateway.members_of(&general).len() == 1).await;
    common::send_event(&mut alice, "leaveChannel", json!("general")).await;
    common::wait_until(|| state.gateway.members_of(&general).is_empty()).await;

    assert_eq!(state.gateway.publish_new_message("general", json!({})), 0);
    common::assert_no_event(&mut alice, "newMessage").await;
}

#[tokio::test]
async fn unrecognized_frames_are_ignored() {
    let (addr, state, _directory) = common::start_ws_server().await;
    let general = RoomId::channel("general");

    let mut alice = common::connect_as(addr, &state, "alice").await;
    alice
        .send(tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();
    common::send_event(&mut alice, "selfDestruct", json!({})).await;
    alice
        .send(tungstenite::Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();

    // Still connected and still served.
    common::send_event(&mut alice, "joinChannel", json!("general")).await;
    common::wait_until(|| state.gateway.members_of(&general).len() == 1).await;
    assert_eq!(state.gateway.publish_message_deleted("general", json!({ "id": "m1" })), 1);
    let deleted = common::next_event(&mut alice, "messageDeleted").await;
    assert_eq!(deleted["data"], json!({ "id": "m1" }));
}

#[tokio::test]
async fn typing_reaches_others_in_channel_only() {
    let (addr, state, _directory) = common::start_ws_server().await;
    let general = RoomId::channel("general");

    let mut alice = common::connect_as(addr, &state, "alice").await;
    let mut bob = common::connect_as(addr, &state, "bob").await;
    let mut carol = common::connect_as(addr, &state, "carol").await;
    common::send_event(&mut alice, "joinChannel", json!("general")).await;
    common::send_event(&mut bob, "joinChannel", json!("general")).await;
    common::wait_until(|| state.gateway.members_of(&general).len() == 2).await;

    common::send_event(&mut alice, "typing", json!({ "channelId": "general", "isTyping": true })).await;

    let typing = common::next_event(&mut bob, "userTyping").await;
    assert_eq!(
        typing["data"],
        json!({
            "userId": "alice",
            "username": "alice_name",
            "displayName": "User alice",
            "isTyping": true
        })
    );
    common::assert_no_event(&mut alice, "userTyping").await;
    common::assert_no_event(&mut carol, "userTyping").await;
}

#[tokio::test]
async fn mention_reaches_every_device_of_user() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let mut phone = common::connect_as(addr, &state, "alice").await;
    let mut laptop = common::connect_as(addr, &state, "alice").await;
    let mut bob = common::connect_as(addr, &state, "bob").await;

    let payload = json!({ "message": { "_id": "m1" }, "channel": { "_id": "general" } });
    assert_eq!(state.gateway.publish_mention("alice", payload.clone()), 2);

    assert_eq!(common::next_event(&mut phone, "mention").await["data"], payload);
    assert_eq!(common::next_event(&mut laptop, "mention").await["data"], payload);
    common::assert_no_event(&mut bob, "mention").await;
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_announced_after_last_device_disconnects() {
    let (addr, state, directory) = common::start_ws_server().await;

    let mut carol = common::connect_as(addr, &state, "carol").await;
    common::next_event(&mut carol, "userStatus").await;

    let mut phone = common::connect_as(addr, &state, "alice").await;
    let laptop = common::connect_as(addr, &state, "alice").await;
    let online = common::next_event(&mut carol, "userStatus").await;
    assert_eq!(online["data"], json!({ "userId": "alice", "status": "online" }));

    phone.close(None).await.unwrap();
    common::wait_until(|| state.gateway.connections_of("alice").len() == 1).await;
    assert!(state.gateway.is_online("alice"));
    common::assert_no_event(&mut carol, "userStatus").await;

    drop(laptop);
    common::wait_until(|| !state.gateway.is_online("alice")).await;
    let offline = common::next_event(&mut carol, "userStatus").await;
    assert_eq!(offline["data"], json!({ "userId": "alice", "status": "offline" }));

    common::wait_until(|| {
        directory
            .presence_writes()
            .iter()
            .any(|w| w.user_id == "alice" && w.status == PresenceStatus::Offline)
    })
    .await;
}

#[tokio::test]
async fn shutdown_closes_every_socket() {
    let (addr, state, _directory) = common::start_ws_server().await;

    let mut alice = common::connect_as(addr, &state, "alice").await;
    let mut bob = common::connect_as(addr, &state, "bob").await;

    assert_eq!(state.gateway.shutdown(), 2);
    assert_eq!(state.gateway.connection_count(), 0);

    assert_eq!(expect_close(&mut alice).await, Some(CloseCode::Away));
    assert_eq!(expect_close(&mut bob).await, Some(CloseCode::Away));
}
