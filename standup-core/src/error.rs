//! Error types for the engine and the chat-platform port.

use crate::types::{ChannelId, StandupId, UserId};

/// Failures reported by a [`ChatPlatform`](crate::platform::ChatPlatform).
///
/// The engine never retries: a lookup failure drops the event that needed
/// it, and a send failure marks the participant's current round as errored.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("failed to send to {channel}: {reason}")]
    Send { channel: ChannelId, reason: String },
    #[error("platform disconnected")]
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum StandupError {
    #[error("a stand-up needs at least one question")]
    NoQuestions,
    #[error("participant registry has shut down")]
    RegistryClosed,
    #[error("{0} is already being awaited")]
    AlreadyAwaited(StandupId),
    #[error("{0} was dropped before it closed")]
    Abandoned(StandupId),
    #[error("could not list members of {channel}: {source}")]
    Members {
        channel: ChannelId,
        #[source]
        source: PlatformError,
    },
}
