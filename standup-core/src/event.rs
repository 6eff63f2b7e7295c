//! Events flowing into the engine.
//!
//! [`PlatformEvent`] is what a chat-platform adapter emits; the inbound
//! router reduces it to [`InboundMessage`]s. [`ParticipantEvent`] is the
//! inbox vocabulary of a participant actor.

use std::sync::Arc;

use crate::error::PlatformError;
use crate::standup::Standup;
use crate::types::{ChannelId, StandupId, UserId};

/// Raw events a platform adapter delivers to the engine.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The adapter's connection is up.
    Connected,

    /// A message in any channel the bot can see, direct messages included.
    Message {
        channel: ChannelId,
        user: UserId,
        text: String,
        /// Platform timestamp, if the adapter has one (for logs only).
        timestamp: Option<String>,
    },

    /// The adapter lost its connection.
    Disconnected { reason: String },
}

/// A reply attributed to a user, ready for the participant registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: ChannelId,
    pub user: UserId,
    pub text: String,
}

/// Events processed one at a time by a participant actor.
#[derive(Debug)]
pub(crate) enum ParticipantEvent {
    /// The participant said something in their direct-message channel.
    Reply(String),
    /// A round wants to interview this participant.
    StartStandup(Arc<Standup>),
    /// A round's clock ran out.
    TimedOut(Arc<Standup>),
    /// A reminder timer fired. Stale generations are ignored.
    Nag { standup: StandupId, generation: u64 },
    /// The outbox could not deliver a message sent on behalf of `standup`.
    SendFailed {
        standup: Option<StandupId>,
        error: PlatformError,
    },
}
