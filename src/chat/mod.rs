//! Chat application module for interactive conversations with a hosted assistant.
//!
//! This module provides a REPL chat interface built on top of the
//! conversation session and the request/poll orchestrator. It supports:
//!
//! - Automatic detection of clarification follow-ups
//! - A fallback reply when an exchange fails
//! - Slash commands for session control
//! - Transcript save, load, and auto-save
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing, the YAML file, and secrets
//! - [`session`]: The caller that owns the conversation and runs exchanges
//! - [`commands`]: Slash command parsing
//! - [`render`]: Terminal output

mod commands;
mod config;
mod render;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    API_KEY_ENV, ASSISTANT_ID_ENV, ChatArgs, ChatConfig, ConfigFile, DEFAULT_FALLBACK_MESSAGE,
    Secrets,
};
pub use render::{PlainTextRenderer, Renderer, format_entry};
pub use session::{ChatSession, Exchange, SessionStats};
