//! Agent loop: plan, optionally act once, then summarize.
//!
//! Every request makes one planning call with the retrieval tool offered.
//! A text reply is the answer. A tool call runs the tool exactly once and is
//! followed by one summarize call with tool use disabled. Both model calls
//! and the tool call go through the shared [`Backoff`].

use std::sync::Arc;

use anyhow::Result;
use chrono::FixedOffset;
use tracing::{debug, error, info};

use relaybot_core::config::schema::AgentConfig;
use relaybot_core::resilience::Backoff;
use relaybot_core::session::SessionStore;
use relaybot_core::types::{Message, ModelReply, ToolCall, ToolChoice, ToolDefinition};
use relaybot_core::utils::now_in;
use relaybot_providers::traits::{LlmProvider, LlmRequestConfig};

use crate::context::ContextBuilder;
use crate::tools::{optional_string, params_from_value, Tool};

/// Reply sent when a request fails for any reason.
pub const APOLOGY: &str =
    "Sorry! Something unexpected went wrong while I was working on your question. 😱";

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Answers questions for actors, one bounded plan/act/summarize cycle each.
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    model: String,
    request_config: LlmRequestConfig,
    tool: Arc<dyn Tool>,
    sessions: Arc<SessionStore>,
    backoff: Backoff,
    context: ContextBuilder,
    offset: FixedOffset,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tool: Arc<dyn Tool>,
        sessions: Arc<SessionStore>,
        backoff: Backoff,
        config: &AgentConfig,
        offset: FixedOffset,
    ) -> Self {
        let model = if config.model.is_empty() {
            provider.default_model().to_string()
        } else {
            config.model.clone()
        };

        info!(
            model = %model,
            provider = provider.display_name(),
            tool = tool.name(),
            max_turns = sessions.max_turns(),
            "Agent loop initialized"
        );

        Self {
            provider,
            model,
            request_config: LlmRequestConfig {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            tool,
            sessions,
            backoff,
            context: ContextBuilder::from_config(config),
            offset,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Answer a question; any failure becomes [`APOLOGY`].
    pub async fn ask(&self, actor_id: &str, question: &str) -> String {
        match self.try_ask(actor_id, question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(actor = %actor_id, question = %question, error = %e, "Agent request failed");
                APOLOGY.to_string()
            }
        }
    }

    /// Answer a question, surfacing the failure.
    ///
    /// The actor's session stays locked for the whole request and is only
    /// updated when the request succeeds.
    pub async fn try_ask(&self, actor_id: &str, question: &str) -> Result<String> {
        let handle = self.sessions.get_or_create(actor_id);
        let mut session = handle.lock().await;

        let time_label = ContextBuilder::time_label(now_in(self.offset));
        let plan_prompt = self.context.plan_prompt(&time_label, question);
        let mut messages = self.context.build_messages(&session.history(), &plan_prompt);
        let mut turns = vec![Message::user(plan_prompt)];
        let definitions = vec![self.tool.to_definition()];

        // Plan
        debug!(actor = %actor_id, history = messages.len() - 2, "Planning call");
        let plan = self.call_model("dialogue.plan", &messages, &definitions, ToolChoice::Auto).await?;

        let (call_id, name, arguments) = match plan {
            ModelReply::Text(answer) => {
                info!(actor = %actor_id, "Answered without the tool");
                turns.push(Message::assistant(answer.clone()));
                session.record(turns, self.sessions.max_turns());
                return Ok(answer);
            }
            ModelReply::ToolCall {
                id,
                name,
                arguments,
            } => (id, name, arguments),
        };

        if name != self.tool.name() {
            anyhow::bail!("model called unknown tool '{name}'");
        }

        // Act
        let mut params = params_from_value(&arguments);
        let query = optional_string(&params, "query").unwrap_or_else(|| question.to_string());
        params.insert("query".to_string(), serde_json::Value::String(query.clone()));
        info!(actor = %actor_id, tool = %name, query = %query, "Running tool");

        let tool = &self.tool;
        let params = &params;
        let observation = self
            .backoff
            .run("tool.retrieval", move || tool.execute(params.clone()))
            .await?;
        debug!(actor = %actor_id, chars = observation.len(), "Tool observation received");

        let summarize_prompt = self.context.summarize_prompt(&time_label, question);
        let act_turns = [
            Message::assistant_tool_call(ToolCall::new(&call_id, &name, arguments.to_string())),
            Message::tool_result(&call_id, observation),
            Message::user(summarize_prompt),
        ];
        messages.extend_from_slice(&act_turns);
        turns.extend(act_turns);

        // Summarize
        let answer = match self
            .call_model("dialogue.summarize", &messages, &definitions, ToolChoice::None)
            .await?
        {
            ModelReply::Text(answer) => answer,
            ModelReply::ToolCall { name, .. } => {
                anyhow::bail!("model called '{name}' while tool use was disabled")
            }
        };

        info!(actor = %actor_id, "Answered with retrieved information");
        turns.push(Message::assistant(answer.clone()));
        session.record(turns, self.sessions.max_turns());
        Ok(answer)
    }

    /// One dialogue call through the backoff, converted to a tagged reply.
    async fn call_model(
        &self,
        label: &str,
        messages: &[Message],
        definitions: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> Result<ModelReply> {
        let provider = &self.provider;
        let model = self.model.as_str();
        let config = &self.request_config;
        let response = self
            .backoff
            .run(label, move || {
                provider.chat(messages, Some(definitions), tool_choice, model, config)
            })
            .await?;
        Ok(response.into_reply()?)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
