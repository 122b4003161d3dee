//! Presence derived from the connection registry.
//!
//! A user is online iff they have at least one live connection. The registry
//! reports each admission and eviction together with the before/after value
//! of that predicate; only a change produces a `userStatus` broadcast and a
//! presence write. Status is never stored here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::directory::UserDirectory;

use super::events::{PresenceStatus, ServerEvent, UserStatusPayload};
use super::fanout::Broadcaster;

/// Receives online/offline evaluations from the registry.
///
/// Called while the registry holds the user's entry, so implementations must
/// not call back into the registry's per-user queries.
pub trait PresenceObserver: Send + Sync {
    fn on_connection_admitted(&self, user_id: &str, was_online: bool, is_online: bool);
    fn on_connection_evicted(&self, user_id: &str, was_online: bool, is_online: bool);
}

/// A status to persist through the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: String,
    pub status: PresenceStatus,
    pub at: DateTime<Utc>,
}

pub struct PresenceTracker {
    broadcaster: Broadcaster,
    writes: mpsc::UnboundedSender<PresenceRecord>,
}

impl PresenceTracker {
    /// Returns the tracker and the stream of presence writes it produces.
    pub fn new(broadcaster: Broadcaster) -> (Self, mpsc::UnboundedReceiver<PresenceRecord>) {
        let (writes, rx) = mpsc::unbounded_channel();
        (Self { broadcaster, writes }, rx)
    }

    /// Broadcast a status to every connection and queue it for persistence.
    /// Returns how many connections received the event.
    pub fn announce(&self, user_id: &str, status: PresenceStatus) -> usize {
        let event = ServerEvent::UserStatus(UserStatusPayload {
            user_id: user_id.to_string(),
            status,
        });
        let delivered = self.broadcaster.to_all(&event);

        let record = PresenceRecord {
            user_id: user_id.to_string(),
            status,
            at: Utc::now(),
        };
        if self.writes.send(record).is_err() {
            tracing::debug!(%user_id, "presence writer stopped, status not persisted");
        }
        delivered
    }

    fn evaluate(&self, user_id: &str, was_online: bool, is_online: bool) {
        if was_online == is_online {
            return;
        }
        let status = if is_online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        };
        tracing::info!(%user_id, %status, "presence changed");
        self.announce(user_id, status);
    }
}

impl PresenceObserver for PresenceTracker {
    fn on_connection_admitted(&self, user_id: &str, was_online: bool, is_online: bool) {
        self.evaluate(user_id, was_online, is_online);
    }

    fn on_connection_evicted(&self, user_id: &str, was_online: bool, is_online: bool) {
        self.evaluate(user_id, was_online, is_online);
    }
}

/// Drain presence writes into the user directory. Failures are logged and skipped.
pub fn spawn_presence_writer(
    mut rx: mpsc::UnboundedReceiver<PresenceRecord>,
    directory: Arc<dyn UserDirectory>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if let Err(e) = directory
                .record_presence(&record.user_id, record.status, record.at)
                .await
            {
                tracing::warn!(user_id = %record.user_id, error = %e, "failed to persist presence");
            }
        }
        tracing::debug!("presence writer finished");
    })
}
