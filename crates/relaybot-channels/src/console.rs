//! Console transport: stdin lines become inbound messages and outbound
//! messages are printed.
//!
//! The console speaks as one configured actor in one tenant. `:channel <id>`
//! switches the chat channel lines are posted to, `:quit` stops reading.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use relaybot_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use relaybot_core::config::schema::ConsoleConfig;

use crate::base::Channel;

pub const CONSOLE_TRANSPORT: &str = "console";

/// What a console line asks for.
#[derive(Debug)]
enum LineAction {
    Skip,
    Quit,
    SwitchChannel(String),
    Publish(InboundMessage),
}

pub struct ConsoleChannel {
    bus: Arc<MessageBus>,
    identity: ConsoleConfig,
    channel_id: Mutex<String>,
    out: Mutex<Box<dyn Write + Send>>,
    shutdown: Notify,
}

impl ConsoleChannel {
    pub fn new(bus: Arc<MessageBus>, identity: ConsoleConfig) -> Self {
        Self::with_writer(bus, identity, Box::new(std::io::stdout()))
    }

    /// Print outbound messages to `out` instead of stdout.
    pub fn with_writer(bus: Arc<MessageBus>, identity: ConsoleConfig, out: Box<dyn Write + Send>) -> Self {
        let channel_id = identity.channel_id.clone();
        Self {
            bus,
            identity,
            channel_id: Mutex::new(channel_id),
            out: Mutex::new(out),
            shutdown: Notify::new(),
        }
    }

    /// Chat channel lines are currently posted to.
    pub fn current_channel(&self) -> String {
        self.channel_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish every line from `reader` until it ends, `:quit`, or stop.
    pub async fn run_with<R: AsyncBufRead + Unpin>(&self, reader: R) -> anyhow::Result<()> {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = self.shutdown.notified() => break,
            };
            let Some(line) = line else {
                debug!("Console input closed");
                break;
            };

            match self.interpret(&line) {
                LineAction::Skip => {}
                LineAction::Quit => break,
                LineAction::SwitchChannel(channel) => {
                    info!(channel = %channel, "Console switched channel");
                    *self.channel_id.lock().unwrap_or_else(PoisonError::into_inner) = channel.clone();
                    self.print(&format!("{} now posting to #{channel}", "»".dimmed()));
                }
                LineAction::Publish(msg) => {
                    if let Err(e) = self.bus.publish_inbound(msg).await {
                        error!(error = %e, "Failed to publish console message");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn interpret(&self, line: &str) -> LineAction {
        let line = line.trim();
        if line.is_empty() {
            return LineAction::Skip;
        }
        if matches!(line, ":quit" | ":exit") {
            return LineAction::Quit;
        }
        if let Some(channel) = line.strip_prefix(":channel") {
            let channel = channel.trim().trim_start_matches('#');
            return if channel.is_empty() {
                LineAction::Skip
            } else {
                LineAction::SwitchChannel(channel.to_string())
            };
        }

        let id = &self.identity;
        let mut msg = InboundMessage::new(CONSOLE_TRANSPORT, &id.actor_id, self.current_channel(), line);
        msg.sender_name = Some(id.actor_name.clone());
        if !id.tenant_id.is_empty() {
            msg = msg.in_tenant(&id.tenant_id, &id.tenant_name);
        }
        msg.metadata.insert("is_admin".into(), id.is_admin.to_string());
        LineAction::Publish(msg)
    }

    fn render(msg: &OutboundMessage) -> String {
        if msg.direct {
            format!("{} {}", format!("[DM → {}]", msg.chat_id).magenta().bold(), msg.content)
        } else {
            format!("{} {}", format!("[#{}]", msg.chat_id).cyan().bold(), msg.content)
        }
    }

    fn print(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{text}").and_then(|_| out.flush()) {
            error!(error = %e, "Failed to write console output");
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        CONSOLE_TRANSPORT
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!(actor = %self.identity.actor_id, tenant = %self.identity.tenant_id, "Console channel listening");
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.shutdown.notify_waiters();
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        self.print(&Self::render(msg));
        Ok(())
    }
}
