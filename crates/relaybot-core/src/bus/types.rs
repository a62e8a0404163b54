//! Bus event types: messages flowing between transports and the relay core.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An inbound message from a transport.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Transport name (e.g. "console").
    pub channel: String,
    /// Actor identifier within the transport.
    pub sender_id: String,
    /// Display name of the actor, if the transport knows it.
    pub sender_name: Option<String>,
    /// Chat channel the message arrived in.
    pub chat_id: String,
    /// Tenant (server/workspace) scope; `None` for direct messages.
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Transport-specific metadata (e.g. `is_admin`).
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create a new inbound message with minimal required fields.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            chat_id: chat_id.into(),
            tenant_id: None,
            tenant_name: None,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Scope the message to a tenant.
    pub fn in_tenant(mut self, tenant_id: impl Into<String>, tenant_name: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.tenant_name = Some(tenant_name.into());
        self
    }

    /// Whether the content is a slash command.
    pub fn is_command(&self) -> bool {
        self.content.trim_start().starts_with('/')
    }

    /// Name shown when the message is quoted elsewhere.
    pub fn author(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.sender_id)
    }

    /// Whether the transport flagged the sender as a tenant administrator.
    pub fn sender_is_admin(&self) -> bool {
        self.metadata.get("is_admin").is_some_and(|v| v == "true")
    }
}

/// An outbound message to a transport.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    /// Target transport name.
    pub channel: String,
    /// Target chat channel, or the recipient actor when `direct` is set.
    pub chat_id: String,
    pub content: String,
    /// Deliver as a direct message to an actor instead of into a channel.
    pub direct: bool,
    /// Optional message ID to reply to.
    pub reply_to: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl OutboundMessage {
    /// Create a message addressed to a chat channel.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            direct: false,
            reply_to: None,
            metadata: HashMap::new(),
        }
    }

    /// Create a direct message addressed to an actor.
    pub fn direct(
        channel: impl Into<String>,
        actor_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            direct: true,
            ..OutboundMessage::new(channel, actor_id, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("console", "user_42", "general", "Hello!");

        assert_eq!(msg.channel, "console");
        assert_eq!(msg.sender_id, "user_42");
        assert_eq!(msg.chat_id, "general");
        assert!(msg.tenant_id.is_none());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_in_tenant_sets_scope() {
        let msg = InboundMessage::new("console", "u", "c", "hi").in_tenant("100", "Guild");
        assert_eq!(msg.tenant_id.as_deref(), Some("100"));
        assert_eq!(msg.tenant_name.as_deref(), Some("Guild"));
    }

    #[test]
    fn test_is_command() {
        assert!(InboundMessage::new("console", "u", "c", "  /ping").is_command());
        assert!(!InboundMessage::new("console", "u", "c", "hello /ping").is_command());
    }

    #[test]
    fn test_author_falls_back_to_id() {
        let mut msg = InboundMessage::new("console", "user_1", "c", "hi");
        assert_eq!(msg.author(), "user_1");
        msg.sender_name = Some("Mina".into());
        assert_eq!(msg.author(), "Mina");
    }

    #[test]
    fn test_admin_flag_from_metadata() {
        let mut msg = InboundMessage::new("console", "u", "c", "hi");
        assert!(!msg.sender_is_admin());
        msg.metadata.insert("is_admin".into(), "true".into());
        assert!(msg.sender_is_admin());
    }

    #[test]
    fn test_outbound_direct() {
        let msg = OutboundMessage::direct("console", "owner_1", "ping");
        assert!(msg.direct);
        assert_eq!(msg.chat_id, "owner_1");
        assert!(!OutboundMessage::new("console", "c", "x").direct);
    }
}
