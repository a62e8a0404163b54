//! Translation through the dialogue provider.
//!
//! Two modes: automatic translation of relayed channel messages, where the
//! model detects the source language and decides whether translation is
//! needed, and manual translation into an explicit language.

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use relaybot_core::config::schema::TranslationConfig;
use relaybot_core::resilience::Backoff;
use relaybot_core::types::{Message, ToolChoice};
use relaybot_providers::traits::{LlmProvider, LlmRequestConfig};

/// Languages translation can target, as `(code, name)`.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("ko", "Korean"),
    ("en", "English"),
    ("ja", "Japanese"),
    ("zh", "Chinese"),
    ("fr", "French"),
    ("de", "German"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("ru", "Russian"),
    ("pt", "Portuguese"),
];

/// Display name for a supported language code (case-insensitive).
pub fn language_name(code: &str) -> Option<&'static str> {
    let code = code.trim().to_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Model verdict for an automatically relayed message.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AutoTranslation {
    #[serde(default)]
    pub detected_language_code: String,
    #[serde(default)]
    pub translation_needed: bool,
    #[serde(default)]
    pub translated_text: String,
}

pub struct Translator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    request_config: LlmRequestConfig,
    backoff: Backoff,
}

impl Translator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &TranslationConfig, backoff: Backoff) -> Self {
        let model = if config.model.is_empty() {
            provider.default_model().to_string()
        } else {
            config.model.clone()
        };
        Self {
            provider,
            model,
            request_config: LlmRequestConfig {
                temperature: config.temperature,
                ..LlmRequestConfig::default()
            },
            backoff,
        }
    }

    /// Detect the language of `text` and translate it into `target` if needed.
    pub async fn auto_translate(&self, text: &str, target: &str) -> anyhow::Result<AutoTranslation> {
        let target_name = language_name(target).unwrap_or(target);
        let prompt = format!(
            "Analyze the following text. 1. First, identify the main language of the text. \
             2. If the text is already written in {target_name}, translation is not needed. \
             3. Translate the text into {target_name} ({target}) ONLY IF translation is necessary. \
             Provide the output ONLY in JSON format: \
             {{\"detected_language_code\": \"ISO 639-1 code\", \"translation_needed\": boolean, \
             \"translated_text\": \"Translated text or empty string\"}} \
             Original Text: --- {text} ---"
        );

        let prompt = prompt.as_str();
        let result = self
            .backoff
            .run("translation.auto", move || async move {
                let raw = self.complete(prompt).await?;
                let cleaned = strip_code_fences(&raw);
                serde_json::from_str::<AutoTranslation>(&cleaned)
                    .with_context(|| format!("unparseable translation verdict: {cleaned}"))
            })
            .await?;

        if result.translated_text.is_empty() {
            debug!(detected = %result.detected_language_code, "No translation produced");
        } else {
            info!(
                detected = %result.detected_language_code,
                target = %target,
                "Message auto-translated"
            );
        }
        Ok(result)
    }

    /// Translate `text` into the language with `code`.
    ///
    /// An empty model answer counts as a failure and is retried.
    pub async fn translate(&self, text: &str, code: &str) -> anyhow::Result<String> {
        let target_name = language_name(code).unwrap_or(code);
        let prompt = format!(
            "Translate the following text into {target_name}. Just provide the translated text directly.\n\n\
             Text to translate:\n---\n{text}\n---"
        );

        let prompt = prompt.as_str();
        self.backoff
            .run("translation.manual", move || async move {
                let translated = self.complete(prompt).await?.trim().to_string();
                if translated.is_empty() {
                    anyhow::bail!("translated text is empty");
                }
                Ok(translated)
            })
            .await
    }

    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let messages = [Message::user(prompt)];
        let response = self
            .provider
            .chat(&messages, None, ToolChoice::Auto, &self.model, &self.request_config)
            .await?;
        Ok(response.content.unwrap_or_default())
    }
}

/// Remove markdown code fences around a JSON answer.
fn strip_code_fences(raw: &str) -> String {
    raw.trim().replace("```json", "").replace("```", "").trim().to_string()
}
