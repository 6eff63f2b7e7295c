//! Round configuration and the copy participants see.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub const DEFAULT_QUESTIONS: &[&str] = &[
    "What did you do yesterday?",
    "What are you planning to do today?",
    "Are you blocked by anything? If so, what?",
    "How are you feeling?",
];

pub const DEFAULT_NAGS: &[&str] = &[
    "_nuzzle_ Don't forget me!",
    "_offers paw_ Do you have anything to say today?",
    "_wide puppy eyes_ Why are you so silent?",
    "Nudge. Nudgenudge.",
    "_stands right beside you, wagging tail so it thwocks against your leg_",
    "_paces around you_",
    "_drops the stand-up talking stick at your feet_",
];

/// Settings shared by every round and participant in the process.
///
/// Deserializes from TOML with durations given in seconds:
///
/// ```toml
/// questions = ["What did you do yesterday?"]
/// duration_secs = 240
/// nag_delays_secs = [60, 120, 180]
/// skip_keyword = "skip"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StandupConfig {
    pub questions: Vec<String>,
    /// How long a round stays open before absent participants are closed out.
    #[serde(rename = "duration_secs", deserialize_with = "secs")]
    pub duration: Duration,
    /// Offsets from a participant's round start at which reminders fire.
    #[serde(rename = "nag_delays_secs", deserialize_with = "secs_list")]
    pub nag_delays: Vec<Duration>,
    pub skip_keyword: String,
    pub prompts: Prompts,
}

impl Default for StandupConfig {
    fn default() -> Self {
        Self {
            questions: DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            duration: Duration::from_secs(4 * 60),
            nag_delays: [1, 2, 3].map(|m| Duration::from_secs(m * 60)).to_vec(),
            skip_keyword: "skip".to_string(),
            prompts: Prompts::default(),
        }
    }
}

impl StandupConfig {
    /// Whether `text` is the skip command, ignoring case and surrounding space.
    pub fn is_skip(&self, text: &str) -> bool {
        normalise_command(text) == normalise_command(&self.skip_keyword)
    }
}

/// Direct-message copy. `{channel}` and `{skip}` are substituted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub start: String,
    pub end: String,
    pub time_up: String,
    pub already_finished: String,
    pub next_standup: String,
    pub confirm_skip: String,
    pub nags: Vec<String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            start: "*WOOF!* Stand-up for #{channel} starting.\nMessage me `{skip}` to duck out of this one.".to_string(),
            end: "Thanks! All done.".to_string(),
            time_up: "Too slow! The stand-up's finished now. Catch up in the channel.".to_string(),
            already_finished: "Your next standup would have been for #{channel} but it's already finished. Catch up in the channel.".to_string(),
            next_standup: "But wait, you have another stand-up to attend…".to_string(),
            confirm_skip: "Okay!".to_string(),
            nags: DEFAULT_NAGS.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Fill the `{channel}` and `{skip}` placeholders of a prompt.
pub fn render(template: &str, channel: &str, skip: &str) -> String {
    template.replace("{channel}", channel).replace("{skip}", skip)
}

pub(crate) fn normalise_command(text: &str) -> String {
    text.trim().to_lowercase()
}

fn secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
}

fn secs_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
    Ok(Vec::<u64>::deserialize(d)?
        .into_iter()
        .map(Duration::from_secs)
        .collect())
}
