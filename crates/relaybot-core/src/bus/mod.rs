//! Message bus, event types, and the outbound delivery port.

pub mod delivery;
pub mod queue;
pub mod types;

pub use delivery::{Delivery, OperatorContact};
pub use queue::MessageBus;
pub use types::{InboundMessage, OutboundMessage};
