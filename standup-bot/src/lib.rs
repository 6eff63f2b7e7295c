//! standup-bot: runs stand-up rounds against a chat platform.
//!
//! - [`settings`]: round config and workspace roster files
//! - [`console`]: a terminal-backed chat platform for local runs

pub mod console;
pub mod settings;
