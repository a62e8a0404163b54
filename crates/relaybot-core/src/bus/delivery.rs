//! Outbound delivery port.
//!
//! Background jobs (reminders, operator alerts, broadcasts) deliver directly
//! instead of going through the bus so they learn whether the send failed.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::types::OutboundMessage;

/// Something that can push a message to a transport and report failure.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}

/// Direct line to the process operator.
#[derive(Clone)]
pub struct OperatorContact {
    delivery: Arc<dyn Delivery>,
    transport: String,
    operator_id: String,
}

impl OperatorContact {
    pub fn new(
        delivery: Arc<dyn Delivery>,
        transport: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Self {
            delivery,
            transport: transport.into(),
            operator_id: operator_id.into(),
        }
    }

    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }

    /// Send a direct message to the operator.
    pub async fn notify(&self, text: impl Into<String>) -> anyhow::Result<()> {
        let msg = OutboundMessage::direct(&self.transport, &self.operator_id, text);
        self.delivery.deliver(&msg).await
    }

    /// Send a direct message, logging instead of failing.
    pub async fn notify_best_effort(&self, text: impl Into<String>) {
        if let Err(e) = self.notify(text).await {
            warn!(operator = %self.operator_id, error = %e, "Failed to notify operator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Delivery for Recorder {
        async fn deliver(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("transport down");
            }
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notify_sends_direct_message() {
        let recorder = Arc::new(Recorder {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let contact = OperatorContact::new(recorder.clone(), "console", "owner_1");

        contact.notify("hello operator").await.unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].direct);
        assert_eq!(sent[0].chat_id, "owner_1");
        assert_eq!(sent[0].content, "hello operator");
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let recorder = Arc::new(Recorder {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let contact = OperatorContact::new(recorder.clone(), "console", "owner_1");

        assert!(contact.notify("x").await.is_err());
        contact.notify_best_effort("x").await;
        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
