//! Channel trait: the interface every chat transport implements.
//!
//! - `start()` begins listening and publishing inbound messages (long-running)
//! - `stop()` shuts the transport down
//! - `send()` delivers one outbound message
//! - `name()` identifies the transport in `OutboundMessage.channel`

use async_trait::async_trait;
use relaybot_core::bus::OutboundMessage;

/// A chat transport.
///
/// The `ChannelManager` holds `Arc<dyn Channel>` and drives start, stop,
/// and outbound routing across every registered transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Transport name; must match `OutboundMessage.channel`.
    fn name(&self) -> &str;

    /// Listen for incoming messages until stopped or the input ends.
    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver a message into a chat channel, or to an actor when `msg.direct` is set.
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockChannel {
        started: AtomicBool,
        sent: tokio::sync::Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
            self.sent.lock().await.push(msg.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_as_trait_object() {
        let ch: Box<dyn Channel> = Box::new(MockChannel {
            started: AtomicBool::new(false),
            sent: tokio::sync::Mutex::new(Vec::new()),
        });
        assert_eq!(ch.name(), "mock");
        ch.start().await.unwrap();
        ch.send(&OutboundMessage::direct("mock", "u1", "psst")).await.unwrap();
        ch.stop().await.unwrap();
    }
}
