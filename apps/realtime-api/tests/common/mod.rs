#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header};
use serde::Serialize;
use tokio::time;
use tokio_tungstenite::tungstenite;

use realtime_api::config::Config;
use realtime_api::directory::{MemoryDirectory, UserIdentity};
use realtime_api::gateway::presence::spawn_presence_writer;
use realtime_api::AppState;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-do-not-use-in-production";
pub const TEST_INTERNAL_KEY: &str = "test-internal-key";

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Session token claims (mirrors what the CRUD layer issues).
#[derive(Debug, Serialize)]
pub struct TestClaims {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

fn sign(claims: &TestClaims) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint a valid session token for `user_id`.
pub fn mint_token(user_id: &str) -> String {
    let now = chrono::Utc::now();
    sign(&TestClaims {
        id: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::seconds(300)).timestamp(),
    })
}

/// Mint an expired session token for testing.
pub fn mint_expired_token(user_id: &str) -> String {
    let now = chrono::Utc::now();
    sign(&TestClaims {
        id: user_id.to_string(),
        iat: (now - chrono::Duration::seconds(600)).timestamp(),
        exp: (now - chrono::Duration::seconds(300)).timestamp(),
    })
}

pub fn test_user(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        username: format!("{id}_name"),
        display_name: format!("User {id}"),
    }
}

/// Build a test AppState backed by an in-memory directory seeded with
/// `alice`, `bob` and `carol`. Spawns the presence writer, so call it from
/// inside a runtime.
pub fn test_state_with(config: Config) -> (AppState, Arc<MemoryDirectory>) {
    let directory = Arc::new(MemoryDirectory::new());
    for id in ["alice", "bob", "carol"] {
        directory.insert(test_user(id));
    }

    let (state, writes) = AppState::new(config, directory.clone());
    spawn_presence_writer(writes, directory.clone());
    (state, directory)
}

pub fn test_state() -> (AppState, Arc<MemoryDirectory>) {
    test_state_with(Config::for_testing(TEST_JWT_SECRET, TEST_INTERNAL_KEY))
}

pub fn test_app(state: AppState) -> axum::Router {
    realtime_api::routes::router().with_state(state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn start_ws_server_with(config: Config) -> (SocketAddr, AppState, Arc<MemoryDirectory>) {
    let (state, directory) = test_state_with(config);
    let app = test_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, directory)
}

pub async fn start_ws_server() -> (SocketAddr, AppState, Arc<MemoryDirectory>) {
    start_ws_server_with(Config::for_testing(TEST_JWT_SECRET, TEST_INTERNAL_KEY)).await
}

/// Open a socket and send the auth frame. Does not wait for admission.
pub async fn connect_with_frame(addr: SocketAddr, frame: serde_json::Value) -> WsStream {
    let url = format!("ws://{addr}/socket");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send auth frame");
    ws
}

/// Connect as `user_id` and wait until the gateway has admitted the connection.
pub async fn connect_as(addr: SocketAddr, state: &AppState, user_id: &str) -> WsStream {
    let before = state.gateway.connections_of(user_id).len();
    let ws = connect_with_frame(addr, serde_json::json!({ "auth": { "token": mint_token(user_id) } })).await;
    wait_until(|| state.gateway.connections_of(user_id).len() > before).await;
    ws
}

/// Send a client event envelope.
pub async fn send_event(ws: &mut WsStream, event: &str, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send event");
}

/// Read frames until an event named `name` arrives, skipping others.
pub async fn next_event(ws: &mut WsStream, name: &str) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timeout waiting for {name}"))
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(&text).expect("parse event");
            if value["event"] == name {
                return value;
            }
        }
    }
}

/// Assert that no event named `name` arrives within a short window.
pub async fn assert_no_event(ws: &mut WsStream, name: &str) {
    let deadline = time::Instant::now() + Duration::from_millis(200);
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                let value: serde_json::Value = serde_json::from_str(&text).expect("parse event");
                assert_ne!(value["event"], name, "unexpected {name}: {value}");
            }
            Ok(Some(Ok(_))) => continue,
            Ok(_) => return,
        }
    }
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(time::Instant::now() < deadline, "condition not met in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}
