//! Participant registry: maps platform ids to participant actors.
//!
//! The registry runs as a single task fed by a [`RegistryHandle`]. Because
//! it resolves one request at a time, a user who shows up through a reply
//! and an invite at the same moment still gets exactly one actor.
//!
//! Users that turn out to be bots, and direct-message channels that cannot
//! be attributed to anyone, are remembered so they are never looked up
//! again. Lookup *errors* are not remembered: the triggering event is
//! dropped and the next one retries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::StandupConfig;
use crate::error::{PlatformError, StandupError};
use crate::event::InboundMessage;
use crate::participant::{self, ParticipantHandle};
use crate::platform::ChatPlatform;
use crate::standup::Standup;
use crate::types::{ChannelId, UserId};

const COMMAND_BUFFER: usize = 256;

#[derive(Debug)]
enum Command {
    Reply(InboundMessage),
    Start {
        standup: Arc<Standup>,
        user: UserId,
        accepted: oneshot::Sender<bool>,
    },
}

/// A handle to the running registry.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Command>,
}

impl RegistryHandle {
    /// Hand a direct-message reply to the participant it came from.
    pub async fn route_reply(&self, message: InboundMessage) -> Result<(), StandupError> {
        self.tx
            .send(Command::Reply(message))
            .await
            .map_err(|_| StandupError::RegistryClosed)
    }

    /// Invite `user` to `standup`. Resolves to `true` once the invite has
    /// been handed to the participant's actor, `false` if the user cannot
    /// take part (bot account, lookup failure).
    pub async fn route_start(
        &self,
        standup: Arc<Standup>,
        user: UserId,
    ) -> Result<bool, StandupError> {
        let (accepted, rx) = oneshot::channel();
        self.tx
            .send(Command::Start {
                standup,
                user,
                accepted,
            })
            .await
            .map_err(|_| StandupError::RegistryClosed)?;
        rx.await.map_err(|_| StandupError::RegistryClosed)
    }
}

pub struct Registry {
    platform: Arc<dyn ChatPlatform>,
    config: Arc<StandupConfig>,
    by_user: HashMap<UserId, ParticipantHandle>,
    by_channel: HashMap<ChannelId, ParticipantHandle>,
    ignored_users: HashSet<UserId>,
    ignored_channels: HashSet<ChannelId>,
}

impl Registry {
    /// Start the registry task.
    pub fn spawn(platform: Arc<dyn ChatPlatform>, config: Arc<StandupConfig>) -> RegistryHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let registry = Self {
            platform,
            config,
            by_user: HashMap::new(),
            by_channel: HashMap::new(),
            ignored_users: HashSet::new(),
            ignored_channels: HashSet::new(),
        };
        tokio::spawn(registry.run(rx));
        RegistryHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!("participant registry started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Reply(message) => self.route_reply(message).await,
                Command::Start {
                    standup,
                    user,
                    accepted,
                } => {
                    let ok = self.route_start(standup, &user).await;
                    let _ = accepted.send(ok);
                }
            }
        }
        tracing::info!("participant registry stopped");
    }

    async fn route_reply(&mut self, message: InboundMessage) {
        let participant = match self.by_channel.get(&message.channel) {
            Some(participant) => participant.clone(),
            None => match self.lookup_by_channel(&message.channel).await {
                Ok(Some(participant)) => participant,
                Ok(None) => {
                    tracing::debug!(channel = %message.channel, "message from unattributable channel ignored");
                    return;
                }
                Err(e) => {
                    tracing::warn!(channel = %message.channel, error = %e, "error getting channel info; message dropped");
                    return;
                }
            },
        };
        tracing::debug!(user = %participant.user(), "delivering reply");
        participant.deliver_reply(message.text);
    }

    async fn route_start(&mut self, standup: Arc<Standup>, user: &UserId) -> bool {
        let participant = match self.by_user.get(user) {
            Some(participant) => participant.clone(),
            None => match self.lookup_by_user(user).await {
                Ok(Some(participant)) => participant,
                Ok(None) => {
                    tracing::debug!(user = %user, "not inviting non-human account");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "error getting user info; invite dropped");
                    return false;
                }
            },
        };
        participant.start_standup(standup);
        true
    }

    async fn lookup_by_channel(
        &mut self,
        channel: &ChannelId,
    ) -> Result<Option<ParticipantHandle>, PlatformError> {
        if self.ignored_channels.contains(channel) {
            return Ok(None);
        }
        let Some(user) = self.platform.resolve_channel_owner(channel).await? else {
            self.ignored_channels.insert(channel.clone());
            return Ok(None);
        };
        if let Some(existing) = self.by_user.get(&user).cloned() {
            self.by_channel.insert(channel.clone(), existing.clone());
            return Ok(Some(existing));
        }
        if self.ignored_users.contains(&user) {
            self.ignored_channels.insert(channel.clone());
            return Ok(None);
        }
        let participant = self.create(user, channel.clone()).await?;
        if participant.is_none() {
            self.ignored_channels.insert(channel.clone());
        }
        Ok(participant)
    }

    async fn lookup_by_user(
        &mut self,
        user: &UserId,
    ) -> Result<Option<ParticipantHandle>, PlatformError> {
        if self.ignored_users.contains(user) {
            return Ok(None);
        }
        let channel = self.platform.open_direct_channel(user).await?;
        self.create(user.clone(), channel).await
    }

    async fn create(
        &mut self,
        user: UserId,
        dm_channel: ChannelId,
    ) -> Result<Option<ParticipantHandle>, PlatformError> {
        let profile = self.platform.user_profile(&user).await?;
        if profile.is_bot {
            self.ignored_users.insert(user);
            return Ok(None);
        }
        tracing::info!(user = %user, name = %profile.display_name, "participant created");
        let participant = participant::spawn(
            profile,
            dm_channel.clone(),
            self.platform.clone(),
            self.config.clone(),
        );
        self.by_user.insert(user, participant.clone());
        self.by_channel.insert(dm_channel, participant.clone());
        Ok(Some(participant))
    }
}
