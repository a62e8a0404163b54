//! Relaybot core: shared types, message bus, configuration, session and
//! settings stores, and resilience primitives.

pub mod bus;
pub mod config;
pub mod log_forward;
pub mod resilience;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
