//! HTTP client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! The default base URL is Gemini's OpenAI-compatible endpoint; any other
//! compatible server works by setting `provider.apiBase`.

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use relaybot_core::config::schema::ProviderConfig;
use relaybot_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ToolChoice,
    ToolDefinition,
};

use crate::traits::{LlmProvider, LlmRequestConfig};

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A dialogue-model client that talks to an OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    default_model: String,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider from the provider config.
    pub fn new(config: &ProviderConfig, model: &str) -> anyhow::Result<Self> {
        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("building HTTP client")?;

        Ok(HttpProvider {
            client,
            api_base: config.api_base().to_string(),
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
        })
    }

    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

/// Strip routing prefixes the endpoint does not understand
/// (`gemini/gemini-2.5-flash`, `models/gemini-2.5-flash`).
fn resolve_model_name(model: &str) -> &str {
    model
        .strip_prefix("gemini/")
        .or_else(|| model.strip_prefix("models/"))
        .unwrap_or(model)
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        tool_choice: ToolChoice,
        model: &str,
        config: &LlmRequestConfig,
    ) -> anyhow::Result<LlmResponse> {
        let resolved_model = resolve_model_name(model);

        debug!(
            model = %resolved_model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            tool_choice = ?tool_choice,
            "Calling LLM"
        );

        let request_body = ChatCompletionRequest {
            model: resolved_model.to_string(),
            messages: messages.to_vec(),
            tools: tools.map(|t| t.to_vec()),
            tool_choice: tools.map(|_| tool_choice),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .headers(self.extra_headers.clone())
            .json(&request_body)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %error_text, "API error");
            bail!("LLM API returned {}: {}", status, error_text);
        }

        let chat_resp: ChatCompletionResponse = response
            .json()
            .await
            .context("parsing LLM response")?;
        if chat_resp.choices.is_empty() {
            bail!("LLM response contained no choices");
        }

        let llm_resp: LlmResponse = chat_resp.into();
        debug!(
            has_content = llm_resp.content.is_some(),
            tool_calls = llm_resp.tool_calls.len(),
            finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(llm_resp)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        "OpenAI-compatible"
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an HttpProvider, refusing to start without an API key.
pub fn create_provider(config: &ProviderConfig, model: &str) -> anyhow::Result<HttpProvider> {
    if !config.is_configured() {
        bail!(
            "No API key configured for model '{}'. Set provider.apiKey in the config \
             or RELAYBOT_PROVIDER__API_KEY.",
            model
        );
    }

    debug!(model = model, api_base = config.api_base(), "Creating LLM provider");

    HttpProvider::new(config, model)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
