//! Core types for Relaybot.
//!
//! The dialogue boundary speaks the OpenAI chat completions format, so turn
//! records, tool calls and tool definitions mirror that wire shape. On top of
//! it sits [`ModelReply`], the tagged form the agent loop actually branches on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────
// Messages (OpenAI chat completions format)
// ─────────────────────────────────────────────

/// A single turn record. Each variant maps to a `role` field value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Create an assistant message carrying one tool invocation.
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Message::Assistant {
            content: None,
            tool_calls: Some(vec![call]),
        }
    }

    /// Create a tool observation message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool Calls (function calling)
// ─────────────────────────────────────────────

/// A tool call from the assistant, requesting execution of a function.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique ID for this tool call (used to match results).
    pub id: String,
    /// Always "function" in current OpenAI API.
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// The function name and arguments within a tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

// ─────────────────────────────────────────────
// Tool Definitions (for LLM requests)
// ─────────────────────────────────────────────

/// Definition of a tool, sent to the model so it knows what it may call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Schema of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Whether the model may invoke tools on a given call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides between text and a tool call.
    #[default]
    Auto,
    /// Tool use is explicitly disabled.
    None,
}

// ─────────────────────────────────────────────
// LLM Response
// ─────────────────────────────────────────────

/// Response from a dialogue model after one chat completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content from the assistant (None if only tool calls).
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    /// A plain text response.
    pub fn text(content: impl Into<String>) -> Self {
        LlmResponse {
            content: Some(content.into()),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }

    /// A response carrying a single tool call.
    pub fn tool_call(call: ToolCall) -> Self {
        LlmResponse {
            tool_calls: vec![call],
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into the tagged reply the agent loop branches on.
    ///
    /// A reply is either text or exactly one tool invocation. When a tool call
    /// is present any accompanying text is ignored.
    pub fn into_reply(self) -> Result<ModelReply, ReplyError> {
        let mut calls = self.tool_calls;
        match calls.len() {
            0 => match self.content {
                Some(text) if !text.trim().is_empty() => Ok(ModelReply::Text(text)),
                _ => Err(ReplyError::Empty),
            },
            1 => {
                let call = calls.remove(0);
                let arguments = if call.function.arguments.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e| {
                        ReplyError::BadArguments {
                            name: call.function.name.clone(),
                            reason: e.to_string(),
                        }
                    })?
                };
                Ok(ModelReply::ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                })
            }
            n => Err(ReplyError::MultipleToolCalls(n)),
        }
    }
}

/// Token usage statistics from the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model reply: free text or one structured tool invocation, never both.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

impl ModelReply {
    /// Rebuild the wire-format tool call for recording in history.
    pub fn to_tool_call(&self) -> Option<ToolCall> {
        match self {
            ModelReply::ToolCall {
                id,
                name,
                arguments,
            } => Some(ToolCall::new(id, name, arguments.to_string())),
            ModelReply::Text(_) => None,
        }
    }
}

/// The model answered outside its contract.
#[derive(Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("model returned neither text nor a tool call")]
    Empty,
    #[error("model returned {0} tool calls, expected at most one")]
    MultipleToolCalls(usize),
    #[error("tool call '{name}' has unparseable arguments: {reason}")]
    BadArguments { name: String, reason: String },
}

// ─────────────────────────────────────────────
// Provider wire types
// ─────────────────────────────────────────────

/// Raw chat completion response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(resp: ChatCompletionResponse) -> Self {
        match resp.choices.into_iter().next() {
            Some(c) => LlmResponse {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                finish_reason: c.finish_reason,
                usage: resp.usage,
            },
            None => LlmResponse::default(),
        }
    }
}

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

// ─────────────────────────────────────────────
// Session types
// ─────────────────────────────────────────────

/// The turn records produced by one successful request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exchange {
    pub messages: Vec<Message>,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// One actor's conversational context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub actor_id: String,
    pub exchanges: Vec<Exchange>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    pub fn new(actor_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Session {
            actor_id: actor_id.into(),
            exchanges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// All recorded turns, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.exchanges
            .iter()
            .flat_map(|e| e.messages.iter().cloned())
            .collect()
    }

    /// Append one exchange, keeping at most `max_turns` exchanges (0 = unbounded).
    ///
    /// Whole exchanges are evicted, so a tool call is never separated from
    /// its observation.
    pub fn record(&mut self, messages: Vec<Message>, max_turns: usize) {
        let now = chrono::Utc::now();
        self.exchanges.push(Exchange { messages, at: now });
        if max_turns > 0 && self.exchanges.len() > max_turns {
            let excess = self.exchanges.len() - max_turns;
            self.exchanges.drain(..excess);
        }
        self.updated_at = now;
    }

    pub fn turn_count(&self) -> usize {
        self.exchanges.len()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_message_serialization() {
        let msg = Message::user("Hello, world!");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "Hello, world!");
    }

    #[test]
    fn test_assistant_tool_call_serialization() {
        let call = ToolCall::new("call_1", "comprehensive_search_and_scrape", r#"{"query":"rust"}"#);
        let json = serde_json::to_value(Message::assistant_tool_call(call)).unwrap();

        assert_eq!(json["role"], "assistant");
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(
            json["tool_calls"][0]["function"]["name"],
            "comprehensive_search_and_scrape"
        );
    }

    #[test]
    fn test_tool_result_serialization() {
        let json = serde_json::to_value(Message::tool_result("call_1", "evidence")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "evidence");
    }

    #[test]
    fn test_tool_choice_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ToolChoice::Auto).unwrap(), json!("auto"));
        assert_eq!(serde_json::to_value(ToolChoice::None).unwrap(), json!("none"));
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let req = ChatCompletionRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: None,
            max_tokens: None,
            temperature: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    // ── ModelReply conversion ──

    #[test]
    fn test_text_reply() {
        let reply = LlmResponse::text("hello").into_reply().unwrap();
        assert_eq!(reply, ModelReply::Text("hello".into()));
    }

    #[test]
    fn test_tool_call_reply_parses_arguments() {
        let resp = LlmResponse::tool_call(ToolCall::new("c1", "search", r#"{"query":"weather"}"#));
        match resp.into_reply().unwrap() {
            ModelReply::ToolCall {
                id,
                name,
                arguments,
            } => {
                assert_eq!(id, "c1");
                assert_eq!(name, "search");
                assert_eq!(arguments["query"], "weather");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        let resp = LlmResponse::tool_call(ToolCall::new("c1", "search", ""));
        let reply = resp.into_reply().unwrap();
        assert_eq!(
            reply,
            ModelReply::ToolCall {
                id: "c1".into(),
                name: "search".into(),
                arguments: json!({}),
            }
        );
    }

    #[test]
    fn test_empty_response_is_contract_violation() {
        assert_eq!(LlmResponse::default().into_reply(), Err(ReplyError::Empty));
        assert_eq!(LlmResponse::text("   ").into_reply(), Err(ReplyError::Empty));
    }

    #[test]
    fn test_multiple_tool_calls_rejected() {
        let resp = LlmResponse {
            tool_calls: vec![ToolCall::new("a", "x", "{}"), ToolCall::new("b", "x", "{}")],
            ..Default::default()
        };
        assert_eq!(resp.into_reply(), Err(ReplyError::MultipleToolCalls(2)));
    }

    #[test]
    fn test_bad_arguments_rejected() {
        let resp = LlmResponse::tool_call(ToolCall::new("a", "x", "{not json"));
        assert!(matches!(
            resp.into_reply(),
            Err(ReplyError::BadArguments { .. })
        ));
    }

    #[test]
    fn test_chat_completion_response_conversion() {
        let raw = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"query\":\"x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        });
        let resp: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let llm: LlmResponse = resp.into();
        assert!(llm.has_tool_calls());
        assert_eq!(llm.usage.unwrap().total_tokens, 8);
    }

    // ── Session window ──

    #[test]
    fn test_session_record_evicts_whole_exchanges() {
        let mut session = Session::new("actor-1");
        for i in 0..7 {
            session.record(
                vec![
                    Message::user(format!("q{i}")),
                    Message::assistant_tool_call(ToolCall::new(format!("c{i}"), "t", "{}")),
                    Message::tool_result(format!("c{i}"), "obs"),
                    Message::assistant(format!("a{i}")),
                ],
                5,
            );
        }
        assert_eq!(session.turn_count(), 5);
        let history = session.history();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0], Message::user("q2"));
    }

    #[test]
    fn test_session_unbounded_when_zero() {
        let mut session = Session::new("a");
        for _ in 0..10 {
            session.record(vec![Message::user("q")], 0);
        }
        assert_eq!(session.turn_count(), 10);
    }
}
