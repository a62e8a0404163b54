//! Per-actor conversation sessions.
//!
//! Sessions live in memory only; a process restart starts every actor fresh.

pub mod manager;

pub use manager::{SessionHandle, SessionStore};
