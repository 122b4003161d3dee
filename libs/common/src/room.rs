//! Room identifiers shared between the realtime service and the CRUD layer.
//!
//! The rendered forms (`channel:<id>` and `user:<id>`) are part of the
//! contract with the CRUD layer and must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const CHANNEL_PREFIX: &str = "channel:";
const USER_PREFIX: &str = "user:";

/// The two kinds of broadcast scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    /// One per chat channel.
    Channel,
    /// One per user; every connection of that user is a member.
    User,
}

/// A named broadcast scope, e.g. `channel:general` or `user:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn channel(channel_id: &str) -> Self {
        Self(format!("{CHANNEL_PREFIX}{channel_id}"))
    }

    pub fn user(user_id: &str) -> Self {
        Self(format!("{USER_PREFIX}{user_id}"))
    }

    pub fn kind(&self) -> RoomKind {
        if self.0.starts_with(USER_PREFIX) {
            RoomKind::User
        } else {
            RoomKind::Channel
        }
    }

    /// The channel or user id without the room prefix.
    pub fn target_id(&self) -> &str {
        match self.kind() {
            RoomKind::User => &self.0[USER_PREFIX.len()..],
            RoomKind::Channel => &self.0[CHANNEL_PREFIX.len()..],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a well-formed room id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRoomId(pub String);

impl fmt::Display for InvalidRoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid room id: {:?}", self.0)
    }
}

impl std::error::Error for InvalidRoomId {}

impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(CHANNEL_PREFIX)
            .or_else(|| s.strip_prefix(USER_PREFIX));
        match rest {
            Some(id) if !id.is_empty() => Ok(Self(s.to_string())),
            _ => Err(InvalidRoomId(s.to_string())),
        }
    }
}

impl TryFrom<String> for RoomId {
    type Error = InvalidRoomId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.0
    }
}
