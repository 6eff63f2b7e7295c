//! In-memory chat platform for driving rounds end to end.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use standup_core::event::InboundMessage;
use standup_core::{
    Channel, ChannelId, ChatPlatform, PlatformError, Registry, RoundContext, StandupConfig,
    UserId, UserProfile,
};

/// Direct-message channel id the fake platform assigns to `user`.
pub fn dm(user: &str) -> ChannelId {
    ChannelId::new(format!("D{user}"))
}

pub fn channel(id: &str, name: &str) -> Channel {
    Channel {
        id: ChannelId::from(id),
        name: name.to_string(),
    }
}

pub fn config() -> StandupConfig {
    StandupConfig {
        questions: vec!["Q1?".to_string(), "Q2?".to_string()],
        duration: Duration::from_secs(240),
        nag_delays: [60, 120, 180].map(Duration::from_secs).to_vec(),
        ..StandupConfig::default()
    }
}

#[derive(Default)]
pub struct MockPlatform {
    profiles: HashMap<UserId, UserProfile>,
    members: HashMap<ChannelId, Vec<UserId>>,
    failing: Mutex<HashSet<ChannelId>>,
    sent: Mutex<Vec<(ChannelId, String)>>,
    profile_lookups: Mutex<HashMap<UserId, usize>>,
    owner_lookups: Mutex<HashMap<ChannelId, usize>>,
    notify: Notify,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, id: &str, name: &str) -> Self {
        self.profiles.insert(
            UserId::from(id),
            UserProfile {
                id: UserId::from(id),
                display_name: name.to_string(),
                is_bot: false,
            },
        );
        self
    }

    pub fn bot(mut self, id: &str) -> Self {
        self.profiles.insert(
            UserId::from(id),
            UserProfile {
                id: UserId::from(id),
                display_name: id.to_lowercase(),
                is_bot: true,
            },
        );
        self
    }

    pub fn channel(mut self, id: &str, members: &[&str]) -> Self {
        self.members.insert(
            ChannelId::from(id),
            members.iter().map(|m| UserId::from(*m)).collect(),
        );
        self
    }

    pub fn fail_sends_to(&self, channel: ChannelId) {
        self.failing.lock().insert(channel);
    }

    pub fn messages_to(&self, channel: &ChannelId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Wait until at least `count` messages have gone to `channel`.
    pub async fn wait_for(&self, channel: &ChannelId, count: usize) -> Vec<String> {
        loop {
            let notified = self.notify.notified();
            let messages = self.messages_to(channel);
            if messages.len() >= count {
                return messages;
            }
            notified.await;
        }
    }

    pub fn profile_lookups(&self, user: &str) -> usize {
        self.profile_lookups
            .lock()
            .get(&UserId::from(user))
            .copied()
            .unwrap_or(0)
    }

    pub fn owner_lookups(&self, channel: &str) -> usize {
        self.owner_lookups
            .lock()
            .get(&ChannelId::from(channel))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<(), PlatformError> {
        if self.failing.lock().contains(channel) {
            return Err(PlatformError::Send {
                channel: channel.clone(),
                reason: "channel_not_found".to_string(),
            });
        }
        self.sent.lock().push((channel.clone(), text.to_string()));
        self.notify.notify_waiters();
        Ok(())
    }

    async fn resolve_channel_owner(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<UserId>, PlatformError> {
        *self.owner_lookups.lock().entry(channel.clone()).or_default() += 1;
        Ok(channel
            .as_str()
            .strip_prefix('D')
            .map(UserId::from)
            .filter(|user| self.profiles.contains_key(user)))
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, PlatformError> {
        if !self.profiles.contains_key(user) {
            return Err(PlatformError::UnknownUser(user.clone()));
        }
        Ok(dm(user.as_str()))
    }

    async fn user_profile(&self, user: &UserId) -> Result<UserProfile, PlatformError> {
        *self.profile_lookups.lock().entry(user.clone()).or_default() += 1;
        self.profiles
            .get(user)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownUser(user.clone()))
    }

    async fn channel_members(&self, channel: &ChannelId) -> Result<Vec<UserId>, PlatformError> {
        self.members
            .get(channel)
            .cloned()
            .ok_or_else(|| PlatformError::Lookup(format!("no channel {channel}")))
    }
}

pub fn context(platform: &Arc<MockPlatform>, config: &StandupConfig) -> RoundContext {
    let platform: Arc<dyn ChatPlatform> = platform.clone();
    RoundContext {
        registry: Registry::spawn(platform.clone(), Arc::new(config.clone())),
        platform,
        bot_user: None,
        tracker: None,
    }
}

/// Deliver a direct message from `user` as the platform would.
pub async fn reply(ctx: &RoundContext, user: &str, text: &str) {
    ctx.registry
        .route_reply(InboundMessage {
            channel: dm(user),
            user: UserId::from(user),
            text: text.to_string(),
        })
        .await
        .unwrap();
}
