//! Relaybot channels: chat transports and outbound routing.
//!
//! This crate provides:
//! - **base**: The `Channel` trait every transport implements
//! - **manager**: `ChannelManager` lifecycle orchestration and the
//!   `ChannelRouter` delivery port
//! - **console**: A stdin/stdout transport for local use

pub mod base;
pub mod console;
pub mod manager;

pub use base::Channel;
pub use console::{ConsoleChannel, CONSOLE_TRANSPORT};
pub use manager::{ChannelManager, ChannelRouter};
