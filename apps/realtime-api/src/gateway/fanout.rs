//! Event broadcaster: room, user and global fan-out to connection queues.
//!
//! Each call serializes the event once and queues it on every recipient
//! without waiting. Recipients are a snapshot taken at call time; a full or
//! closed queue drops the frame for that connection only and is never retried.
//! Dead connections are removed by their own transport loop, not here.

use std::sync::Arc;

use praseodym_common::RoomId;

use super::events::ServerEvent;
use super::registry::ConnectionRegistry;
use super::rooms::MembershipTable;
use super::session::{DeliveryError, Frame, Outbound};

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<MembershipTable>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<MembershipTable>) -> Self {
        Self { registry, rooms }
    }

    /// Deliver to every current member of `room`. Returns how many queues accepted it.
    pub fn to_room(&self, room: &RoomId, event: &ServerEvent) -> usize {
        self.to_room_except(room, event, None)
    }

    /// Deliver to every current member of `room` except `excluded`.
    pub fn to_room_except(&self, room: &RoomId, event: &ServerEvent, excluded: Option<&str>) -> usize {
        let members = self.rooms.members_of(room);
        if members.is_empty() {
            return 0;
        }
        let Some(frame) = encode(event) else {
            return 0;
        };

        let recipients = members
            .iter()
            .filter(|id| Some(id.as_str()) != excluded)
            .filter_map(|id| self.registry.outbound(id).map(|o| (id.as_str(), o)));
        let delivered = deliver(recipients, &frame, event.name());

        tracing::debug!(%room, event = event.name(), delivered, "room broadcast");
        delivered
    }

    /// Deliver to every connection of `user_id` through the user's room.
    pub fn to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.to_room(&RoomId::user(user_id), event)
    }

    /// Deliver to every registered connection.
    pub fn to_all(&self, event: &ServerEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let outbounds = self.registry.outbounds();
        let delivered = deliver(
            outbounds.iter().map(|(id, o)| (id.as_str(), o.clone())),
            &frame,
            event.name(),
        );

        tracing::debug!(event = event.name(), delivered, "global broadcast");
        delivered
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}

fn deliver<'a>(
    recipients: impl Iterator<Item = (&'a str, Outbound)>,
    frame: &Frame,
    event_name: &str,
) -> usize {
    let mut delivered = 0;
    for (connection_id, outbound) in recipients {
        match outbound.try_deliver(frame) {
            Ok(()) => delivered += 1,
            Err(DeliveryError::Full) => {
                tracing::warn!(%connection_id, event = event_name, "outbound queue full, event dropped");
            }
            Err(DeliveryError::Closed) => {
                tracing::debug!(%connection_id, event = event_name, "connection closed mid-dispatch");
            }
        }
    }
    delivered
}
