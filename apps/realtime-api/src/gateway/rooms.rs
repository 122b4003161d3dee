//! Room membership table: room id → connections currently subscribed.
//!
//! A mechanical pub/sub primitive. Whether a user may be in a room is decided by
//! the CRUD layer before `join` is ever called.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use praseodym_common::RoomId;

use super::session::ConnectionId;

#[derive(Default)]
pub struct MembershipTable {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    /// Returns `false` if the connection was already a member.
    pub fn join(&self, connection_id: &str, room: &RoomId) -> bool {
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id.to_string())
    }

    /// Remove a connection from a room. Empty rooms are dropped from the table.
    /// Returns `false` if the connection was not a member.
    pub fn leave(&self, connection_id: &str, room: &RoomId) -> bool {
        match self.rooms.entry(room.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(connection_id);
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of the room's members; empty if the room does not exist.
    pub fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
