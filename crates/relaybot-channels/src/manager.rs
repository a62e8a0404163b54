//! Channel manager: transport lifecycle and outbound routing.
//!
//! Responsibilities:
//! - Register transports
//! - Start and stop all transports concurrently via `tokio::spawn`
//! - Route outbound messages from the bus to the right transport
//! - Expose a [`ChannelRouter`] so background jobs can deliver directly

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use relaybot_core::bus::{Delivery, MessageBus, OutboundMessage};

use crate::base::Channel;

// ─────────────────────────────────────────────
// ChannelRouter
// ─────────────────────────────────────────────

/// Routes an outbound message to the transport it names.
///
/// Implements [`Delivery`], so reminder firing, operator alerts, and
/// broadcasts learn whether their send failed.
#[derive(Default)]
pub struct ChannelRouter {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, channel);
    }

    fn remove(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered transport names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn all(&self) -> Vec<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Delivery for ChannelRouter {
    async fn deliver(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        let channel = self
            .get(&msg.channel)
            .ok_or_else(|| anyhow::anyhow!("no transport registered as '{}'", msg.channel))?;
        debug!(
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            direct = msg.direct,
            content_len = msg.content.len(),
            "Delivering message"
        );
        channel.send(msg).await
    }
}

// ─────────────────────────────────────────────
// ChannelManager
// ─────────────────────────────────────────────

/// Manages the lifecycle and outbound routing of every transport.
pub struct ChannelManager {
    router: Arc<ChannelRouter>,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            router: Arc::new(ChannelRouter::new()),
            bus,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a transport. Replaces any previous one with the same name.
    pub fn register(&self, channel: Arc<dyn Channel>) {
        info!(channel = %channel.name(), "Registered channel");
        self.router.insert(channel);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Channel>> {
        let removed = self.router.remove(name);
        if removed.is_some() {
            info!(channel = %name, "Unregistered channel");
        }
        removed
    }

    /// Shared delivery port backed by the registered transports.
    pub fn router(&self) -> Arc<ChannelRouter> {
        self.router.clone()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.router.names()
    }

    pub fn len(&self) -> usize {
        self.router.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start every transport and the outbound dispatcher, then wait for shutdown.
    pub async fn start_all(&self) -> Result<()> {
        let channels = self.router.all();
        if channels.is_empty() {
            warn!("No channels registered, nothing to start");
            return Ok(());
        }
        info!(channels = ?self.channel_names(), "Starting {} channel(s)", channels.len());

        for channel in channels {
            tokio::spawn(async move {
                let name = channel.name().to_string();
                info!(channel = %name, "Channel starting");
                if let Err(e) = channel.start().await {
                    error!(channel = %name, error = %e, "Channel failed");
                }
                info!(channel = %name, "Channel stopped");
            });
        }

        let bus = self.bus.clone();
        let router = self.router.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            Self::dispatch_outbound(bus, router, shutdown).await;
        });

        self.shutdown.notified().await;
        info!("Channel manager shutting down");
        Ok(())
    }

    /// Stop every transport and the outbound dispatcher.
    pub async fn stop_all(&self) {
        info!("Stopping all channels");
        self.shutdown.notify_waiters();
        for channel in self.router.all() {
            if let Err(e) = channel.stop().await {
                error!(channel = %channel.name(), error = %e, "Channel stop failed");
            }
        }
    }

    /// Drain the outbound queue into the transports until shutdown.
    async fn dispatch_outbound(bus: Arc<MessageBus>, router: Arc<ChannelRouter>, shutdown: Arc<Notify>) {
        info!("Outbound dispatcher started");
        loop {
            tokio::select! {
                msg = bus.consume_outbound() => {
                    let Some(outbound) = msg else {
                        info!("Outbound bus closed, dispatcher exiting");
                        break;
                    };
                    if let Err(e) = router.deliver(&outbound).await {
                        error!(channel = %outbound.channel, error = %e, "Failed to send outbound message");
                    }
                }
                _ = shutdown.notified() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MockChannel {
        channel_name: String,
        stopped: AtomicBool,
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    impl MockChannel {
        fn new(name: &str) -> Arc<Self> {
            Self::build(name, false)
        }

        fn failing(name: &str) -> Arc<Self> {
            Self::build(name, true)
        }

        fn build(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel_name: name.into(),
                stopped: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            &self.channel_name
        }

        async fn start(&self) -> anyhow::Result<()> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("transport down");
            }
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        assert!(mgr.is_empty());

        mgr.register(MockChannel::new("console"));
        mgr.register(MockChannel::new("webhook"));
        mgr.register(MockChannel::new("console"));
        assert_eq!(mgr.channel_names(), vec!["console", "webhook"]);

        assert!(mgr.unregister("webhook").is_some());
        assert!(mgr.unregister("webhook").is_none());
        assert_eq!(mgr.len(), 1);
    }

    #[tokio::test]
    async fn test_router_delivers_to_named_transport() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        let console = MockChannel::new("console");
        mgr.register(console.clone());

        let router = mgr.router();
        router
            .deliver(&OutboundMessage::direct("console", "u1", "hi"))
            .await
            .unwrap();
        assert_eq!(console.sent().len(), 1);
        assert!(console.sent()[0].direct);

        let err = router
            .deliver(&OutboundMessage::new("missing", "c1", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_router_surfaces_transport_failure() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        mgr.register(MockChannel::failing("console"));
        let result = mgr
            .router()
            .deliver(&OutboundMessage::new("console", "c1", "hi"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_outbound_routes_by_transport() {
        let bus = Arc::new(MessageBus::new(8));
        let router = Arc::new(ChannelRouter::new());
        let a = MockChannel::new("a");
        let b = MockChannel::new("b");
        router.insert(a.clone());
        router.insert(b.clone());

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(ChannelManager::dispatch_outbound(
            bus.clone(),
            router,
            shutdown.clone(),
        ));

        bus.publish_outbound(OutboundMessage::new("a", "c1", "one")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("b", "c1", "two")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("unknown", "c1", "lost")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("a", "c2", "three")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.notify_waiters();
        handle.await.unwrap();

        assert_eq!(a.sent().len(), 2);
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_all_stops_channels() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        let ch = MockChannel::new("console");
        mgr.register(ch.clone());
        mgr.stop_all().await;
        assert!(ch.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_start_all_without_channels_returns() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        assert!(mgr.start_all().await.is_ok());
    }
}
