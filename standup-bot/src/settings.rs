//! Settings files: round configuration and the console workspace roster.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use standup_core::{Channel, ChannelId, StandupConfig, UserId, UserProfile};

/// Load round settings, falling back to the built-in defaults when no file
/// is given.
pub fn load_config(path: Option<&Path>) -> Result<StandupConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            parse_config(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => StandupConfig::default(),
    };
    Ok(config)
}

pub fn parse_config(text: &str) -> Result<StandupConfig> {
    let config: StandupConfig = toml::from_str(text)?;
    anyhow::ensure!(!config.questions.is_empty(), "at least one question is required");
    anyhow::ensure!(!config.skip_keyword.trim().is_empty(), "skip_keyword must not be blank");
    Ok(config)
}

/// Users and channels of the console workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct Roster {
    /// The bot's own account.
    pub bot: UserProfile,
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub channels: Vec<RosterChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterChannel {
    pub id: ChannelId,
    pub name: String,
    /// The workspace-wide channel. Never gets a round.
    #[serde(default)]
    pub general: bool,
    #[serde(default)]
    pub members: Vec<UserId>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid roster {}", path.display()))
    }

    pub fn profile(&self, user: &UserId) -> Option<&UserProfile> {
        std::iter::once(&self.bot)
            .chain(&self.users)
            .find(|p| &p.id == user)
    }

    /// Look a user up by id or display name.
    pub fn find_user(&self, name_or_id: &str) -> Option<&UserProfile> {
        std::iter::once(&self.bot)
            .chain(&self.users)
            .find(|p| p.id.as_str() == name_or_id || p.display_name == name_or_id)
    }

    pub fn channel(&self, id: &ChannelId) -> Option<&RosterChannel> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// Channels that get a round: the bot is a member and it is not the
    /// general channel.
    pub fn standup_channels(&self) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| !c.general && c.members.contains(&self.bot.id))
            .map(|c| Channel {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
        [bot]
        id = "B0"
        display_name = "standupbot"
        is_bot = true

        [[users]]
        id = "U1"
        display_name = "alice"

        [[channels]]
        id = "C0"
        name = "general"
        general = true
        members = ["B0", "U1"]

        [[channels]]
        id = "C1"
        name = "eng"
        members = ["B0", "U1"]

        [[channels]]
        id = "C2"
        name = "random"
        members = ["U1"]
    "#;

    #[test]
    fn only_member_non_general_channels_get_rounds() {
        let roster: Roster = toml::from_str(ROSTER).unwrap();
        let channels = roster.standup_channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "eng");
    }

    #[test]
    fn users_resolve_by_id_or_name() {
        let roster: Roster = toml::from_str(ROSTER).unwrap();
        assert_eq!(roster.find_user("alice").unwrap().id, UserId::from("U1"));
        assert_eq!(roster.find_user("U1").unwrap().display_name, "alice");
        assert!(roster.profile(&UserId::from("B0")).unwrap().is_bot);
        assert!(roster.find_user("mallory").is_none());
    }

    #[test]
    fn config_requires_questions() {
        assert!(parse_config("questions = []").is_err());
        let config = parse_config("duration_secs = 60").unwrap();
        assert_eq!(config.duration.as_secs(), 60);
        assert_eq!(config.questions.len(), 4);
    }
}
