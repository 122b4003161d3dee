//! Internal endpoints the CRUD layer calls after persisting a change.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use praseodym_common::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::middleware::InternalCaller;
use crate::error::ApiError;
use crate::gateway::events::{ChannelEventKind, PresenceStatus};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels/{channel_id}/events", post(publish_channel_event))
        .route("/users/{user_id}/mentions", post(publish_mention))
        .route("/users/{user_id}/status", put(set_status))
        .route("/users/{user_id}/presence", get(get_presence))
}

#[derive(Debug, Deserialize)]
pub struct ChannelEventRequest {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveredResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: String,
    pub status: PresenceStatus,
    pub connections: usize,
}

// ---------------------------------------------------------------------------
// POST /internal/channels/:channel_id/events
// ---------------------------------------------------------------------------

async fn publish_channel_event(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(channel_id): Path<String>,
    Json(body): Json<ChannelEventRequest>,
) -> Result<Json<DeliveredResponse>, ApiError> {
    let kind: ChannelEventKind = serde_json::from_value(Value::String(body.event.clone()))
        .map_err(|_| ApiError::bad_request(format!("Unsupported channel event: {}", body.event)))?;

    let event = kind.into_event(body.data);
    let delivered = state.gateway.to_room(&RoomId::channel(&channel_id), &event);

    tracing::debug!(%channel_id, event = %body.event, delivered, "channel event published");
    Ok(Json(DeliveredResponse { delivered }))
}

// ---------------------------------------------------------------------------
// POST /internal/users/:user_id/mentions
// ---------------------------------------------------------------------------

async fn publish_mention(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(user_id): Path<String>,
    Json(payload): Json<Value>,
) -> Json<DeliveredResponse> {
    let delivered = state.gateway.publish_mention(&user_id, payload);
    Json(DeliveredResponse { delivered })
}

// ---------------------------------------------------------------------------
// PUT /internal/users/:user_id/status
// ---------------------------------------------------------------------------

async fn set_status(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(user_id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<DeliveredResponse>, ApiError> {
    let status: PresenceStatus = serde_json::from_value(Value::String(body.status.clone()))
        .map_err(|_| ApiError::bad_request(format!("Unknown status: {}", body.status)))?;
    if status == PresenceStatus::Offline {
        return Err(ApiError::bad_request("Offline status is derived from connections"));
    }

    let delivered = state.gateway.announce_status(&user_id, status).unwrap_or(0);
    Ok(Json(DeliveredResponse { delivered }))
}

// ---------------------------------------------------------------------------
// GET /internal/users/:user_id/presence
// ---------------------------------------------------------------------------

async fn get_presence(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let connections = state.gateway.connections_of(&user_id).len();
    let status = if connections > 0 {
        PresenceStatus::Online
    } else {
        PresenceStatus::Offline
    };
    Json(PresenceResponse {
        user_id,
        status,
        connections,
    })
}
