//! LLM provider trait: the dialogue-model boundary.

use async_trait::async_trait;
use relaybot_core::types::{LlmResponse, Message, ToolChoice, ToolDefinition};

/// Sampling settings passed to each model call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

/// Trait that all dialogue-model backends implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages`: Conversation turns in OpenAI format.
    /// * `tools`: Tool definitions the model may call.
    /// * `tool_choice`: Whether tool use is allowed on this call.
    /// * `model`: Model identifier (e.g. `"gemini-2.5-flash-lite"`).
    /// * `config`: Temperature, max_tokens.
    ///
    /// # Errors
    /// Transport failures, non-2xx statuses, and unparseable bodies are
    /// returned as `Err` so callers can retry them.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        tool_choice: ToolChoice,
        model: &str,
        config: &LlmRequestConfig,
    ) -> anyhow::Result<LlmResponse>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
