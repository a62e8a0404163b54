//! Log forwarding to a chat channel.
//!
//! [`LogForwarder::layer`] is a `tracing_subscriber::Layer` that queues
//! formatted events while a log channel is set. [`LogForwarder::run`]
//! drains the queue every few seconds and posts it in code-fenced chunks.

use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::field::{Field, Visit};
use tracing::{info, warn, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::bus::{Delivery, OutboundMessage};
use crate::utils::{chunk_text, MESSAGE_CHUNK_LIMIT};

/// How often queued lines are flushed.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(3);

/// Lines dropped past this many unflushed entries.
const QUEUE_CAPACITY: usize = 4096;

/// Where forwarded logs are posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogTarget {
    pub transport: String,
    pub channel_id: String,
}

pub struct LogForwarder {
    target: RwLock<Option<LogTarget>>,
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    shutdown: Notify,
}

impl LogForwarder {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Arc::new(Self {
            target: RwLock::new(None),
            tx,
            rx: Mutex::new(rx),
            shutdown: Notify::new(),
        })
    }

    /// Set or clear the log channel. Lines queued for a cleared channel are dropped.
    pub fn set_target(&self, target: Option<LogTarget>) {
        match &target {
            Some(t) => info!(transport = %t.transport, channel = %t.channel_id, "Log channel set"),
            None => info!("Log channel cleared"),
        }
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = target;
    }

    pub fn target(&self) -> Option<LogTarget> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A layer feeding this forwarder. Events at `INFO` and above are queued.
    pub fn layer(self: &Arc<Self>) -> ForwardLayer {
        ForwardLayer {
            forwarder: self.clone(),
        }
    }

    fn enqueue(&self, line: String) {
        if self.target.read().unwrap_or_else(PoisonError::into_inner).is_none() {
            return;
        }
        let _ = self.tx.try_send(line);
    }

    /// Post everything queued so far. Returns the number of lines taken.
    pub async fn flush(&self, delivery: &dyn Delivery) -> usize {
        let mut lines = Vec::new();
        {
            let mut rx = self.rx.lock().await;
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
        }
        let Some(target) = self.target() else {
            return lines.len();
        };
        if lines.is_empty() {
            return 0;
        }

        // Room for the code fence around each chunk.
        for chunk in chunk_text(&lines.join("\n"), MESSAGE_CHUNK_LIMIT - 6) {
            let msg = OutboundMessage::new(&target.transport, &target.channel_id, format!("```{chunk}```"));
            if let Err(e) = delivery.deliver(&msg).await {
                warn!(channel = %target.channel_id, error = %e, "Failed to forward logs");
            }
        }
        lines.len()
    }

    /// Flush every [`FLUSH_INTERVAL`] until [`LogForwarder::stop`] is called.
    pub async fn run(&self, delivery: Arc<dyn Delivery>) {
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush(delivery.as_ref()).await;
                }
                _ = self.shutdown.notified() => {
                    self.flush(delivery.as_ref()).await;
                    return;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

// ─────────────────────────────────────────────
// Layer
// ─────────────────────────────────────────────

pub struct ForwardLayer {
    forwarder: Arc<LogForwarder>,
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // Own failures stay local.
        if *meta.level() > Level::INFO || meta.target() == module_path!() {
            return;
        }
        self.forwarder.enqueue(format_line(event));
    }
}

/// `2026-03-01 12:00:00 [INFO ] relaybot_cron::service: Reminder delivered id=ab12cd34`
fn format_line(event: &Event<'_>) -> String {
    let meta = event.metadata();
    let mut line = format!(
        "{} [{:<5}] {}:",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        meta.level(),
        meta.target()
    );
    event.record(&mut LineVisitor(&mut line));
    line
}

struct LineVisitor<'a>(&'a mut String);

impl Visit for LineVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let _ = write!(self.0, " {value}");
        } else {
            let _ = write!(self.0, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, " {value:?}");
        } else {
            let _ = write!(self.0, " {}={value:?}", field.name());
        }
    }
}
