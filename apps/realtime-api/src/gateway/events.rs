//! Wire-format events exchanged with clients.
//!
//! Every frame after the handshake is an envelope `{"event": <name>, "data": <payload>}`.
//! Event names are part of the client contract and must stay bit-exact.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// The first frame a client sends: `{"auth": {"token": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeFrame {
    #[serde(default)]
    pub auth: Option<HandshakeAuth>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeAuth {
    #[serde(default)]
    pub token: Option<String>,
}

impl HandshakeFrame {
    /// The credential carried in the auth payload, if any. Blank tokens count as missing.
    pub fn credential(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .and_then(|a| a.token.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinChannel(String),
    LeaveChannel(String),
    Typing(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub channel_id: String,
    pub is_typing: bool,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    DoNotDisturb,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Away => "away",
            PresenceStatus::DoNotDisturb => "do_not_disturb",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub is_typing: bool,
}

/// Events dispatched to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Value),
    MessageUpdated(Value),
    MessageDeleted(Value),
    MessageReaction(Value),
    Mention(Value),
    UserStatus(UserStatusPayload),
    UserTyping(UserTypingPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::MessageUpdated(_) => "messageUpdated",
            ServerEvent::MessageDeleted(_) => "messageDeleted",
            ServerEvent::MessageReaction(_) => "messageReaction",
            ServerEvent::Mention(_) => "mention",
            ServerEvent::UserStatus(_) => "userStatus",
            ServerEvent::UserTyping(_) => "userTyping",
        }
    }
}

/// Channel-scoped events the CRUD layer publishes after persisting a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelEventKind {
    NewMessage,
    MessageUpdated,
    MessageDeleted,
    MessageReaction,
}

impl ChannelEventKind {
    pub fn into_event(self, data: Value) -> ServerEvent {
        match self {
            ChannelEventKind::NewMessage => ServerEvent::NewMessage(data),
            ChannelEventKind::MessageUpdated => ServerEvent::MessageUpdated(data),
            ChannelEventKind::MessageDeleted => ServerEvent::MessageDeleted(data),
            ChannelEventKind::MessageReaction => ServerEvent::MessageReaction(data),
        }
    }
}
