//! Inbound routing: platform events in, participant replies out.

use tokio::sync::mpsc;

use crate::event::{InboundMessage, PlatformEvent};
use crate::registry::RegistryHandle;
use crate::types::UserId;

/// Reduce a platform event to a reply worth routing. Drops everything that
/// is not a message, the bot's own messages and empty messages.
pub fn normalise(event: PlatformEvent, bot_user: &UserId) -> Option<InboundMessage> {
    match event {
        PlatformEvent::Message {
            channel,
            user,
            text,
            ..
        } if &user != bot_user && !text.trim().is_empty() => Some(InboundMessage {
            channel,
            user,
            text,
        }),
        _ => None,
    }
}

/// Forward every reply on `events` to the registry until the stream closes
/// or the registry goes away.
pub async fn run_inbound(
    mut events: mpsc::Receiver<PlatformEvent>,
    bot_user: UserId,
    registry: RegistryHandle,
) {
    tracing::debug!("inbound router started");
    while let Some(event) = events.recv().await {
        match &event {
            PlatformEvent::Connected => tracing::info!("platform connected"),
            PlatformEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "platform disconnected")
            }
            PlatformEvent::Message {
                user, timestamp, ..
            } => {
                tracing::debug!(user = %user, timestamp = ?timestamp, "message received")
            }
        }
        let Some(message) = normalise(event, &bot_user) else {
            continue;
        };
        if registry.route_reply(message).await.is_err() {
            tracing::warn!("participant registry closed; inbound router stopping");
            break;
        }
    }
    tracing::debug!("inbound router stopped");
}
