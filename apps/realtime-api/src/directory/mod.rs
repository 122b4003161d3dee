//! The user directory: the external collaborator that owns user records.
//!
//! The realtime layer only needs two things from it: resolving a token's
//! subject to a user, and persisting last-known presence.

pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::gateway::events::PresenceStatus;

/// The identity a connection is bound to for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected user directory response: {0}")]
    Unexpected(String),
}

/// Abstraction over the user directory.
///
/// Backed by the CRUD service over HTTP in production and an in-memory map in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserIdentity>, DirectoryError>;

    /// Persist the last-known status and activity time of a user.
    async fn record_presence(
        &self,
        user_id: &str,
        status: PresenceStatus,
        last_active: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests / local development)
// ---------------------------------------------------------------------------

/// A presence write as seen by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceWrite {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_active: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, UserIdentity>>,
    writes: Mutex<Vec<PresenceWrite>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserIdentity) {
        self.users.lock().insert(user.id.clone(), user);
    }

    pub fn remove(&self, user_id: &str) {
        self.users.lock().remove(user_id);
    }

    /// All presence writes received so far, oldest first.
    pub fn presence_writes(&self) -> Vec<PresenceWrite> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        Ok(self.users.lock().get(user_id).cloned())
    }

    async fn record_presence(
        &self,
        user_id: &str,
        status: PresenceStatus,
        last_active: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        self.writes.lock().push(PresenceWrite {
            user_id: user_id.to_string(),
            status,
            last_active,
        });
        Ok(())
    }
}
