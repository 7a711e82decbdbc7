//! Interactive terminal front-end for agent conversations.
//!
//! This module provides the pieces the `agentchat` binary is built from:
//!
//! - [`config`]: CLI argument parsing and layered configuration
//! - [`commands`]: Slash command parsing
//! - [`view`]: Incremental rendering of a streaming turn

mod commands;
mod config;
mod view;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ChatFileConfig};
pub use view::TurnView;
