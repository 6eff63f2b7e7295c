//! The chat-platform port.
//!
//! The engine owns no transport. Everything it needs from the chat service
//! goes through [`ChatPlatform`], which adapters implement: the console
//! adapter in `standup-bot`, a recording fake in tests, or a real
//! workspace client.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{ChannelId, UserId, UserProfile};

#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Post `text` to a channel or direct-message channel. One attempt only.
    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<(), PlatformError>;

    /// The user a direct-message channel belongs to, or `None` when the
    /// channel is not a direct-message channel this bot can attribute.
    async fn resolve_channel_owner(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<UserId>, PlatformError>;

    /// Open (or reuse) the direct-message channel with `user`.
    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, PlatformError>;

    async fn user_profile(&self, user: &UserId) -> Result<UserProfile, PlatformError>;

    async fn channel_members(&self, channel: &ChannelId) -> Result<Vec<UserId>, PlatformError>;
}
