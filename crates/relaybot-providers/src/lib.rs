//! Dialogue-model layer for Relaybot.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: trait that every model backend implements
//! - [`http_provider::HttpProvider`]: OpenAI-compatible HTTP client
//! - [`http_provider::create_provider`]: builder from config + model name

pub mod http_provider;
pub mod traits;

pub use http_provider::{create_provider, HttpProvider};
pub use traits::{LlmProvider, LlmRequestConfig};
