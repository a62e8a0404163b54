//! Inbound router: consumes the bus and sends each message to the command
//! dispatcher or the relay.

use std::sync::Arc;

use tracing::{debug, error, info};

use relaybot_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use relaybot_core::utils::{chunk_text, MESSAGE_CHUNK_LIMIT};

use crate::dispatcher::{CommandContext, CommandDispatcher, Reply};
use crate::relay::Relay;

pub struct InboundRouter {
    bus: Arc<MessageBus>,
    dispatcher: Arc<CommandDispatcher>,
    relay: Arc<Relay>,
}

impl InboundRouter {
    pub fn new(bus: Arc<MessageBus>, dispatcher: Arc<CommandDispatcher>, relay: Arc<Relay>) -> Self {
        Self {
            bus,
            dispatcher,
            relay,
        }
    }

    /// Poll inbound messages until the bus closes.
    ///
    /// Each message is handled on its own task so slow requests never hold
    /// up other actors.
    pub async fn run(self: Arc<Self>) {
        info!("Inbound router started");
        while let Some(msg) = self.bus.consume_inbound().await {
            let router = self.clone();
            tokio::spawn(async move {
                for out in router.route(&msg).await {
                    if let Err(e) = router.bus.publish_outbound(out).await {
                        error!(error = %e, "Failed to publish outbound message");
                    }
                }
            });
        }
        info!("Inbound channel closed, router exiting");
    }

    /// Handle one message and return what should be sent back.
    pub async fn route(&self, msg: &InboundMessage) -> Vec<OutboundMessage> {
        if msg.is_command() {
            let ctx = CommandContext::from_inbound(msg);
            match self.dispatcher.handle_line(&ctx, &msg.content).await {
                Some(reply) => reply_messages(&ctx, reply),
                None => Vec::new(),
            }
        } else {
            match self.relay.relay(msg).await {
                Some(out) => split_outbound(out),
                None => {
                    debug!(channel = %msg.chat_id, "Message not relayed");
                    Vec::new()
                }
            }
        }
    }
}

/// Address a reply. Private replies inside a tenant go to the actor directly.
fn reply_messages(ctx: &CommandContext, reply: Reply) -> Vec<OutboundMessage> {
    let out = if reply.private && ctx.tenant_id.is_some() {
        OutboundMessage::direct(&ctx.transport, &ctx.actor_id, reply.text)
    } else {
        OutboundMessage::new(&ctx.transport, &ctx.channel_id, reply.text)
    };
    split_outbound(out)
}

fn split_outbound(out: OutboundMessage) -> Vec<OutboundMessage> {
    if out.content.chars().count() <= MESSAGE_CHUNK_LIMIT {
        return vec![out];
    }
    chunk_text(&out.content, MESSAGE_CHUNK_LIMIT)
        .into_iter()
        .map(|content| OutboundMessage {
            content,
            ..out.clone()
        })
        .collect()
}
