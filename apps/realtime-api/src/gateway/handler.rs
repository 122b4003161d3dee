//! Client event dispatch: one named handler per event type.

use crate::auth::{AuthError, Authenticator};
use crate::directory::UserIdentity;

use super::events::{ClientEvent, HandshakeFrame, TypingPayload};
use super::session::ConnectionContext;
use super::Gateway;

/// Authenticate the handshake frame. Nothing is registered on failure.
pub async fn handle_handshake(
    authenticator: &Authenticator,
    frame: &HandshakeFrame,
) -> Result<UserIdentity, AuthError> {
    authenticator.authenticate(frame.credential()).await
}

/// Route a parsed client event to its handler.
pub fn dispatch(gateway: &Gateway, ctx: &ConnectionContext, event: ClientEvent) {
    match event {
        ClientEvent::JoinChannel(channel_id) => on_join_channel(gateway, ctx, &channel_id),
        ClientEvent::LeaveChannel(channel_id) => on_leave_channel(gateway, ctx, &channel_id),
        ClientEvent::Typing(payload) => on_typing(gateway, ctx, payload),
    }
}

fn on_join_channel(gateway: &Gateway, ctx: &ConnectionContext, channel_id: &str) {
    if !gateway.join_channel(ctx, channel_id) {
        tracing::debug!(connection_id = %ctx.connection_id, %channel_id, "join ignored");
        return;
    }
    tracing::debug!(
        connection_id = %ctx.connection_id,
        user_id = %ctx.user_id(),
        %channel_id,
        "joined channel"
    );
}

fn on_leave_channel(gateway: &Gateway, ctx: &ConnectionContext, channel_id: &str) {
    gateway.leave_channel(ctx, channel_id);
    tracing::debug!(
        connection_id = %ctx.connection_id,
        user_id = %ctx.user_id(),
        %channel_id,
        "left channel"
    );
}

fn on_typing(gateway: &Gateway, ctx: &ConnectionContext, payload: TypingPayload) {
    gateway.set_typing(ctx, &payload.channel_id, payload.is_typing);
}
