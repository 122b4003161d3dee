//! Typing indicators: relayed to the channel room as they arrive, never stored.
//!
//! A client that stops sending updates leaves a stale indicator on other
//! clients until their own UI timeout clears it.

use praseodym_common::RoomId;

use super::events::{ServerEvent, UserTypingPayload};
use super::fanout::Broadcaster;
use super::session::ConnectionContext;

#[derive(Clone)]
pub struct TypingNotifier {
    broadcaster: Broadcaster,
}

impl TypingNotifier {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Relay `sender`'s typing state to everyone else in `room`.
    pub fn set_typing(&self, room: &RoomId, sender: &ConnectionContext, is_typing: bool) -> usize {
        let event = ServerEvent::UserTyping(UserTypingPayload {
            user_id: sender.user.id.clone(),
            username: sender.user.username.clone(),
            display_name: sender.user.display_name.clone(),
            is_typing,
        });
        self.broadcaster
            .to_room_except(room, &event, Some(&sender.connection_id))
    }
}
