//! Console chat platform.
//!
//! A stand-in for a chat workspace, driven from a terminal. The roster
//! decides who exists and who sits in which channel. Everything the bot
//! posts is printed to stdout; each stdin line of the form `<user>: <text>`
//! arrives as a direct message from that user (by id or display name).

use std::sync::Arc;

use async_trait::async_trait;
use standup_core::event::PlatformEvent;
use standup_core::{ChannelId, ChatPlatform, PlatformError, UserId, UserProfile};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::settings::Roster;

const EVENT_BUFFER: usize = 64;

pub struct ConsolePlatform {
    roster: Roster,
}

impl ConsolePlatform {
    pub fn new(roster: Roster) -> Self {
        Self { roster }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    fn dm_channel(user: &UserId) -> ChannelId {
        ChannelId::new(format!("D{user}"))
    }

    fn dm_owner(&self, channel: &ChannelId) -> Option<&UserProfile> {
        let user = UserId::from(channel.as_str().strip_prefix('D')?);
        self.roster.profile(&user)
    }

    /// Parse one stdin line into a direct message event.
    pub fn parse_line(&self, line: &str) -> Option<PlatformEvent> {
        let (who, text) = line.split_once(':')?;
        let user = self.roster.find_user(who.trim())?;
        Some(PlatformEvent::Message {
            channel: Self::dm_channel(&user.id),
            user: user.id.clone(),
            text: text.trim().to_string(),
            timestamp: Some(chrono::Local::now().to_rfc3339()),
        })
    }

    /// Read stdin in the background and emit its lines as platform events.
    pub fn spawn_stdin(self: &Arc<Self>) -> mpsc::Receiver<PlatformEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let platform = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(PlatformEvent::Connected).await;
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match platform.parse_line(&line) {
                        Some(event) => {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        None => tracing::warn!("expected `<user>: <text>`, got {line:?}"),
                    },
                    Ok(None) => break "stdin closed".to_string(),
                    Err(e) => break format!("stdin error: {e}"),
                }
            };
            let _ = tx.send(PlatformEvent::Disconnected { reason }).await;
        });
        rx
    }

    fn print(target: &str, text: &str) {
        let now = chrono::Local::now().format("%H:%M:%S");
        let mut lines = text.lines();
        println!("[{now}] {target} <- {}", lines.next().unwrap_or_default());
        for line in lines {
            println!("           {line}");
        }
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn send_message(&self, channel: &ChannelId, text: &str) -> Result<(), PlatformError> {
        if let Some(user) = self.dm_owner(channel) {
            Self::print(&format!("@{}", user.display_name), text);
            return Ok(());
        }
        match self.roster.channel(channel) {
            Some(c) => {
                Self::print(&format!("#{}", c.name), text);
                Ok(())
            }
            None => Err(PlatformError::Send {
                channel: channel.clone(),
                reason: "channel_not_found".to_string(),
            }),
        }
    }

    async fn resolve_channel_owner(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<UserId>, PlatformError> {
        Ok(self.dm_owner(channel).map(|p| p.id.clone()))
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, PlatformError> {
        self.roster
            .profile(user)
            .map(|p| Self::dm_channel(&p.id))
            .ok_or_else(|| PlatformError::UnknownUser(user.clone()))
    }

    async fn user_profile(&self, user: &UserId) -> Result<UserProfile, PlatformError> {
        self.roster
            .profile(user)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownUser(user.clone()))
    }

    async fn channel_members(&self, channel: &ChannelId) -> Result<Vec<UserId>, PlatformError> {
        self.roster
            .channel(channel)
            .map(|c| c.members.clone())
            .ok_or_else(|| PlatformError::Lookup(format!("no such channel {channel}")))
    }
}
