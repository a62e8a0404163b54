//! Context builder: persona prompt and the per-request prompts of the
//! plan and summarize calls.

use chrono::{DateTime, FixedOffset};

use relaybot_core::config::schema::AgentConfig;
use relaybot_core::types::Message;

use crate::tools::RETRIEVAL_TOOL_NAME;

/// Builds system prompts and message lists for the agent loop.
#[derive(Clone, Debug)]
pub struct ContextBuilder {
    agent_name: String,
    reply_language: String,
}

impl ContextBuilder {
    pub fn new(agent_name: impl Into<String>, reply_language: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            reply_language: reply_language.into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.name, &config.reply_language)
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    // ────────────── System prompt ──────────────

    /// The persona every dialogue call starts with.
    pub fn build_system_prompt(&self) -> String {
        format!(
            "# Identity\n\n\
             You are **{name}**, an AI assistant helping the members of a chat community. \
             You plan, use your tool, and solve problems rather than just chatting.\n\n\
             ## Rules\n\
             1. Keep a bright, friendly, and positive tone.\n\
             2. You may refer to yourself as {name}.\n\
             3. Always answer in {language}.\n\
             4. When asked who you are, say you are {name}, an AI assistant made to help this community.\n\n\
             ## Tool protocol\n\
             5. If the message is more than small talk and needs any fact checking or current \
             information, never guess: call `{tool}`.\n\
             6. You have exactly one tool and may call it at most once per question.\n\
             7. When you already know the answer with confidence, reply directly without the tool.",
            name = self.agent_name,
            language = self.reply_language,
            tool = RETRIEVAL_TOOL_NAME,
        )
    }

    // ────────────── Request prompts ──────────────

    /// Human-readable local time used in prompts.
    pub fn time_label(now: DateTime<FixedOffset>) -> String {
        now.format("%Y-%m-%d %H:%M (UTC%:z)").to_string()
    }

    /// First turn of a request: the question with the current time.
    pub fn plan_prompt(&self, time_label: &str, question: &str) -> String {
        format!("The current time is {time_label}. Please answer the following question: {question}")
    }

    /// Instruction appended after the tool observation.
    pub fn summarize_prompt(&self, time_label: &str, question: &str) -> String {
        format!(
            "[Situation]\n\
             - Current time: {time_label}\n\
             - The user's original question: \"{question}\"\n\n\
             [Your task]\n\
             You are a lead research analyst. Using only the web information collected by \
             `{RETRIEVAL_TOOL_NAME}` above, write a clear and detailed final answer to the \
             user's original question. Keep following your persona rules. Do not call any tool."
        )
    }

    // ────────────── Message building ──────────────

    /// System prompt, then session history, then the new user prompt.
    pub fn build_messages(&self, history: &[Message], user_prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.build_system_prompt()));
        messages.extend_from_slice(history);
        messages.push(Message::user(user_prompt));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_prompt_mentions_name_language_and_tool() {
        let ctx = ContextBuilder::new("Relay", "Korean");
        let prompt = ctx.build_system_prompt();
        assert!(prompt.contains("**Relay**"));
        assert!(prompt.contains("answer in Korean"));
        assert!(prompt.contains(RETRIEVAL_TOOL_NAME));
    }

    #[test]
    fn test_time_label() {
        let now = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 14, 5, 0)
            .unwrap();
        assert_eq!(ContextBuilder::time_label(now), "2026-03-01 14:05 (UTC+09:00)");
    }

    #[test]
    fn test_build_messages_order() {
        let ctx = ContextBuilder::from_config(&AgentConfig::default());
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let msgs = ctx.build_messages(&history, "new question");
        assert_eq!(msgs.len(), 4);
        assert!(matches!(&msgs[0], Message::System { .. }));
        assert_eq!(msgs[1], Message::user("earlier"));
        assert_eq!(msgs[3], Message::user("new question"));
    }

    #[test]
    fn test_prompts_carry_question() {
        let ctx = ContextBuilder::new("Relay", "English");
        assert!(ctx.plan_prompt("now", "why is the sky blue").contains("why is the sky blue"));
        let summary = ctx.summarize_prompt("now", "why is the sky blue");
        assert!(summary.contains("\"why is the sky blue\""));
        assert!(summary.contains("Do not call any tool"));
    }
}
