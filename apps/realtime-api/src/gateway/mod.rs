//! Realtime gateway: connection registry, room pub/sub, presence and typing.
//!
//! [`Gateway`] is the process-wide context. It is built once at startup and
//! shared through `AppState`; every component that broadcasts gets it by
//! reference.

pub mod events;
pub mod fanout;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod session;
pub mod typing;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use praseodym_common::id::{prefix, prefixed_ulid};
use praseodym_common::RoomId;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::directory::UserIdentity;

use events::{PresenceStatus, ServerEvent};
use fanout::Broadcaster;
use presence::{PresenceRecord, PresenceTracker};
use registry::{ConnectionInfo, ConnectionRegistry, RegistryError};
use rooms::MembershipTable;
use session::{ConnectionContext, ConnectionId, Frame, Outbound};
use typing::TypingNotifier;

pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<MembershipTable>,
    broadcaster: Broadcaster,
    presence: PresenceTracker,
    typing: TypingNotifier,
    outbound_capacity: usize,
    closing: AtomicBool,
}

impl Gateway {
    /// Build the gateway. The returned receiver carries presence writes and
    /// should be handed to [`presence::spawn_presence_writer`].
    pub fn new(outbound_capacity: usize) -> (Self, mpsc::UnboundedReceiver<PresenceRecord>) {
        let rooms = Arc::new(MembershipTable::new());
        let registry = Arc::new(ConnectionRegistry::new(rooms.clone()));
        let broadcaster = Broadcaster::new(registry.clone(), rooms.clone());
        let (presence, writes) = PresenceTracker::new(broadcaster.clone());
        let typing = TypingNotifier::new(broadcaster.clone());

        let gateway = Self {
            registry,
            rooms,
            broadcaster,
            presence,
            typing,
            outbound_capacity,
            closing: AtomicBool::new(false),
        };
        (gateway, writes)
    }

    /// A fresh outbound queue sized for one connection.
    pub fn open_outbound(&self) -> (Outbound, mpsc::Receiver<Frame>) {
        Outbound::channel(self.outbound_capacity)
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Admit an authenticated user under a newly minted connection id.
    pub fn admit(
        &self,
        user: UserIdentity,
        outbound: Outbound,
    ) -> Result<ConnectionContext, RegistryError> {
        self.admit_with_id(prefixed_ulid(prefix::CONNECTION), user, outbound)
    }

    pub fn admit_with_id(
        &self,
        connection_id: ConnectionId,
        user: UserIdentity,
        outbound: Outbound,
    ) -> Result<ConnectionContext, RegistryError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }
        let user = Arc::new(user);
        self.registry
            .admit(&connection_id, user.clone(), outbound, &self.presence)?;
        // Shutdown may have taken its snapshot while we were registering.
        if self.closing.load(Ordering::SeqCst) {
            self.evict(&connection_id);
            return Err(RegistryError::Closed);
        }
        Ok(ConnectionContext {
            connection_id,
            user,
        })
    }

    /// Remove a connection everywhere. Safe to call for an unknown or already
    /// evicted connection.
    pub fn evict(&self, connection_id: &str) -> HashSet<RoomId> {
        self.registry.evict(connection_id, &self.presence)
    }

    pub fn touch(&self, connection_id: &str) {
        self.registry.touch(connection_id);
    }

    /// Close admission and evict every connection, announcing each affected
    /// user offline. Returns how many connections were evicted.
    pub fn shutdown(&self) -> usize {
        self.closing.store(true, Ordering::SeqCst);
        let ids = self.registry.connection_ids();
        let mut evicted = 0;
        for id in &ids {
            if !self.evict(id).is_empty() {
                evicted += 1;
            }
        }
        tracing::info!(evicted, "gateway shut down");
        evicted
    }

    // -----------------------------------------------------------------------
    // Client operations
    // -----------------------------------------------------------------------

    /// Blank channel ids are ignored.
    pub fn join_channel(&self, ctx: &ConnectionContext, channel_id: &str) -> bool {
        if channel_id.trim().is_empty() {
            return false;
        }
        self.registry
            .join_room(&ctx.connection_id, &RoomId::channel(channel_id))
    }

    pub fn leave_channel(&self, ctx: &ConnectionContext, channel_id: &str) -> bool {
        if channel_id.trim().is_empty() {
            return false;
        }
        self.registry
            .leave_room(&ctx.connection_id, &RoomId::channel(channel_id))
    }

    pub fn set_typing(&self, ctx: &ConnectionContext, channel_id: &str, is_typing: bool) -> usize {
        if channel_id.trim().is_empty() {
            return 0;
        }
        self.typing
            .set_typing(&RoomId::channel(channel_id), ctx, is_typing)
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    pub fn to_room(&self, room: &RoomId, event: &ServerEvent) -> usize {
        self.broadcaster.to_room(room, event)
    }

    pub fn to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.broadcaster.to_user(user_id, event)
    }

    pub fn to_all(&self, event: &ServerEvent) -> usize {
        self.broadcaster.to_all(event)
    }

    pub fn publish_new_message(&self, channel_id: &str, message: Value) -> usize {
        self.to_room(&RoomId::channel(channel_id), &ServerEvent::NewMessage(message))
    }

    pub fn publish_message_updated(&self, channel_id: &str, message: Value) -> usize {
        self.to_room(&RoomId::channel(channel_id), &ServerEvent::MessageUpdated(message))
    }

    pub fn publish_message_deleted(&self, channel_id: &str, payload: Value) -> usize {
        self.to_room(&RoomId::channel(channel_id), &ServerEvent::MessageDeleted(payload))
    }

    pub fn publish_message_reaction(&self, channel_id: &str, message: Value) -> usize {
        self.to_room(&RoomId::channel(channel_id), &ServerEvent::MessageReaction(message))
    }

    pub fn publish_mention(&self, user_id: &str, payload: Value) -> usize {
        self.to_user(user_id, &ServerEvent::Mention(payload))
    }

    /// Broadcast a user-chosen status (away, do-not-disturb, back to online).
    /// Returns `None` without broadcasting when the user has no live connection.
    ///
    /// Runs under the user's registry entry, so it cannot land between an
    /// offline transition and the next online one.
    pub fn announce_status(&self, user_id: &str, status: PresenceStatus) -> Option<usize> {
        self.registry
            .with_online_user(user_id, || self.presence.announce(user_id, status))
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_online(&self, user_id: &str) -> bool {
        self.registry.is_online(user_id)
    }

    pub fn connections_of(&self, user_id: &str) -> Vec<ConnectionId> {
        self.registry.connections_of(user_id)
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.registry.contains(connection_id)
    }

    pub fn connection_info(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.registry.info(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.rooms.members_of(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }
}
