//! Connection registry: the single owner of every live connection.
//!
//! Each connection is bound to exactly one user for its whole lifetime and is
//! implicitly a member of that user's room. The membership table only ever
//! holds connection ids, so `evict` is the one path that removes a connection
//! everywhere.
//!
//! Lock order is `by_user` → `connections` → membership table. Nothing takes
//! them in the opposite direction.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use praseodym_common::RoomId;

use crate::directory::UserIdentity;

use super::presence::PresenceObserver;
use super::rooms::MembershipTable;
use super::session::{ConnectionId, Outbound};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),
    #[error("admission is closed")]
    Closed,
}

/// Per-connection record.
pub struct ConnectionEntry {
    pub user: Arc<UserIdentity>,
    pub rooms: HashSet<RoomId>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    outbound: Outbound,
}

/// Read-only view of a connection, for diagnostics.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub user_id: String,
    pub rooms: HashSet<RoomId>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    by_user: DashMap<String, HashSet<ConnectionId>>,
    rooms: Arc<MembershipTable>,
}

impl ConnectionRegistry {
    pub fn new(rooms: Arc<MembershipTable>) -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            rooms,
        }
    }

    /// Register a connection for `user` and join it to the user's room.
    ///
    /// The presence observer runs while the user's entry is locked, after the
    /// connection is fully registered, so transitions for one user are
    /// reported in order.
    pub fn admit(
        &self,
        connection_id: &str,
        user: Arc<UserIdentity>,
        outbound: Outbound,
        presence: &dyn PresenceObserver,
    ) -> Result<(), RegistryError> {
        let user_id = user.id.clone();
        let user_room = RoomId::user(&user_id);

        let mut user_conns = self.by_user.entry(user_id.clone()).or_default();
        let was_online = !user_conns.is_empty();

        match self.connections.entry(connection_id.to_string()) {
            Entry::Occupied(occupied) => {
                // Release `connections` before touching `by_user` again.
                drop(occupied);
                let empty = user_conns.is_empty();
                drop(user_conns);
                if empty {
                    self.by_user.remove_if(&user_id, |_, conns| conns.is_empty());
                }
                return Err(RegistryError::DuplicateConnection(connection_id.to_string()));
            }
            Entry::Vacant(vacant) => {
                let now = Utc::now();
                let _entry = vacant.insert(ConnectionEntry {
                    user,
                    rooms: HashSet::from([user_room.clone()]),
                    created_at: now,
                    last_active_at: now,
                    outbound,
                });
                self.rooms.join(connection_id, &user_room);
            }
        }

        user_conns.insert(connection_id.to_string());
        presence.on_connection_admitted(&user_id, was_online, true);
        Ok(())
    }

    /// Remove a connection from the registry and from every room it held.
    ///
    /// Returns the rooms it was in. Evicting an unknown connection is a no-op
    /// that returns an empty set.
    pub fn evict(&self, connection_id: &str, presence: &dyn PresenceObserver) -> HashSet<RoomId> {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return HashSet::new();
        };

        for room in &entry.rooms {
            self.rooms.leave(connection_id, room);
        }

        let user_id = entry.user.id.as_str();
        if let Entry::Occupied(mut user_conns) = self.by_user.entry(user_id.to_string()) {
            let was_online = !user_conns.get().is_empty();
            user_conns.get_mut().remove(connection_id);
            let is_online = !user_conns.get().is_empty();
            presence.on_connection_evicted(user_id, was_online, is_online);
            if !is_online {
                user_conns.remove();
            }
        }

        entry.rooms
    }

    /// Subscribe a registered connection to a room. Returns `false` if the
    /// connection is unknown.
    pub fn join_room(&self, connection_id: &str, room: &RoomId) -> bool {
        let Some(mut entry) = self.connections.get_mut(connection_id) else {
            return false;
        };
        if entry.rooms.insert(room.clone()) {
            self.rooms.join(connection_id, room);
        }
        true
    }

    /// Unsubscribe a connection from a room. A connection's own user room
    /// cannot be left; that request is ignored.
    pub fn leave_room(&self, connection_id: &str, room: &RoomId) -> bool {
        let Some(mut entry) = self.connections.get_mut(connection_id) else {
            return false;
        };
        if *room == RoomId::user(&entry.user.id) {
            return false;
        }
        let removed = entry.rooms.remove(room);
        if removed {
            self.rooms.leave(connection_id, room);
        }
        removed
    }

    /// Record inbound activity on a connection.
    pub fn touch(&self, connection_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.last_active_at = Utc::now();
        }
    }

    pub fn connections_of(&self, user_id: &str) -> Vec<ConnectionId> {
        self.by_user
            .get(user_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user
            .get(user_id)
            .is_some_and(|conns| !conns.is_empty())
    }

    /// Run `f` only if `user_id` is online, holding the user's entry for the
    /// duration so no admission or eviction for that user interleaves.
    ///
    /// `f` must not call back into the registry's per-user queries.
    pub fn with_online_user<R>(&self, user_id: &str, f: impl FnOnce() -> R) -> Option<R> {
        let user_conns = self.by_user.get(user_id)?;
        if user_conns.is_empty() {
            return None;
        }
        let result = f();
        drop(user_conns);
        Some(result)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn info(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|e| ConnectionInfo {
            user_id: e.user.id.clone(),
            rooms: e.rooms.clone(),
            created_at: e.created_at,
            last_active_at: e.last_active_at,
        })
    }

    pub fn outbound(&self, connection_id: &str) -> Option<Outbound> {
        self.connections
            .get(connection_id)
            .map(|e| e.outbound.clone())
    }

    /// Snapshot of every registered connection's queue.
    pub fn outbounds(&self) -> Vec<(ConnectionId, Outbound)> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), e.outbound.clone()))
            .collect()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}
