//! Relay path: ordinary messages posted in a tenant's source channels are
//! auto-translated and mirrored into its translation channel.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, error, info};

use relaybot_core::bus::{InboundMessage, OutboundMessage};
use relaybot_core::store::{BlacklistStore, TenantStore};

use crate::translate::{language_name, Translator};

static URL_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$").expect("url regex must compile"));

static HANGUL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{AC00}-\u{D7A3}]").expect("hangul regex must compile"));

static CUSTOM_EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:\w+:\d+>").expect("emoji regex must compile"));

static LETTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z\u{3040}-\u{30FF}\u{4E00}-\u{9FFF}]").expect("letter regex must compile")
});

/// Whether message text is worth sending to the translator.
///
/// Skips empty text, a bare link, anything containing Hangul, and text
/// with no Latin, kana, or CJK letters once custom emoji are removed.
pub fn is_translatable(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || URL_ONLY_RE.is_match(trimmed) {
        return false;
    }
    if HANGUL_RE.is_match(content) {
        return false;
    }
    let stripped = CUSTOM_EMOJI_RE.replace_all(content, "");
    let stripped = stripped.trim();
    !stripped.is_empty() && LETTER_RE.is_match(stripped)
}

pub struct Relay {
    tenants: Arc<TenantStore>,
    blacklist: Arc<BlacklistStore>,
    translator: Arc<Translator>,
}

impl Relay {
    pub fn new(tenants: Arc<TenantStore>, blacklist: Arc<BlacklistStore>, translator: Arc<Translator>) -> Self {
        Self {
            tenants,
            blacklist,
            translator,
        }
    }

    /// Build the mirrored message for `msg`, or `None` when it is not relayed.
    pub async fn relay(&self, msg: &InboundMessage) -> Option<OutboundMessage> {
        let tenant_id = msg.tenant_id.as_deref()?;
        if self.blacklist.is_blocked(Some(tenant_id), &msg.chat_id) {
            return None;
        }

        let settings = match self.tenants.load(tenant_id) {
            Ok(settings) => settings,
            Err(e) => {
                error!(tenant = %tenant_id, error = %e, "Failed to load tenant settings");
                return None;
            }
        };
        if !settings.is_source_channel(&msg.chat_id) {
            return None;
        }
        let destination = settings.translation_channel.as_deref()?;
        if !is_translatable(&msg.content) {
            debug!(tenant = %tenant_id, "Message skipped by relay filters");
            return None;
        }

        info!(tenant = %tenant_id, channel = %msg.chat_id, "Auto-translation triggered");
        let target = settings.target_language.as_str();
        let result = match self.translator.auto_translate(&msg.content, target).await {
            Ok(result) => result,
            Err(e) => {
                error!(tenant = %tenant_id, error = %e, "Auto-translation failed");
                return None;
            }
        };

        let translated = result.translated_text.trim();
        if translated.is_empty() {
            return None;
        }

        let content = format!(
            "**{author}**'s message\n\
             **Original**\n```{original}```\n\
             **Translation**\n```{translated}```\n\
             _auto: {detected} → {language}_",
            author = msg.author(),
            original = msg.content,
            detected = result.detected_language_code,
            language = language_name(target).unwrap_or(target),
        );
        Some(OutboundMessage::new(&msg.channel, destination, content))
    }
}
