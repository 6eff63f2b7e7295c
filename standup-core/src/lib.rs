//! standup-core: the coordination engine behind chat stand-up rounds.
//!
//! - [`standup`]: one round's reply aggregation, completion and summary
//! - [`participant`]: one actor per human, serializing their conversation
//! - [`registry`]: resolves platform ids to participant actors
//! - [`router`]: turns platform events into replies for the registry
//! - [`platform`]: the port adapters implement to reach a chat service

pub mod config;
pub mod error;
pub mod event;
pub mod participant;
pub mod platform;
pub mod registry;
pub mod router;
pub mod standup;
pub mod types;

pub use config::StandupConfig;
pub use error::{PlatformError, StandupError};
pub use platform::ChatPlatform;
pub use registry::{Registry, RegistryHandle};
pub use standup::{ReplyState, RoundContext, Standup, StandupReport};
pub use types::{Channel, ChannelId, StandupId, UserId, UserProfile};
