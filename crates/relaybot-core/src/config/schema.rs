//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `TranslationConfig`, `ProviderConfig`,
//! `SearchConfig`, `ResilienceConfig`, `StorageConfig`, `OperatorConfig`,
//! `ScheduleConfig`, `ConsoleConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.relaybot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub translation: TranslationConfig,
    pub provider: ProviderConfig,
    pub search: SearchConfig,
    pub resilience: ResilienceConfig,
    pub storage: StorageConfig,
    pub operator: OperatorConfig,
    pub schedule: ScheduleConfig,
    pub console: ConsoleConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Dialogue agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Name the assistant introduces itself with.
    pub name: String,
    /// Dialogue model identifier.
    pub model: String,
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Exchanges kept per actor session (0 = unbounded).
    pub max_turns: usize,
    /// Language the assistant answers in.
    pub reply_language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Relay".to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            max_turns: 5,
            reply_language: "Korean".to_string(),
        }
    }
}

/// Translation model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslationConfig {
    pub model: String,
    pub temperature: f64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-lite".to_string(),
            temperature: 0.2,
        }
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Default OpenAI-compatible endpoint for Gemini models.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Dialogue-model endpoint (API key, base URL, headers).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Custom API base URL (defaults to [`DEFAULT_API_BASE`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}

// ─────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────

/// Retrieval tool settings (Google Programmable Search JSON API).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub api_key: String,
    /// Programmable Search Engine id (`cx`).
    pub engine_id: String,
    pub api_base: String,
    /// Top results fetched per query.
    pub max_results: usize,
    /// Characters kept from each fetched page.
    pub max_page_chars: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            engine_id: String::new(),
            api_base: "https://www.googleapis.com/customsearch/v1".to_string(),
            max_results: 3,
            max_page_chars: 4000,
            fetch_timeout_secs: 15,
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.engine_id.is_empty()
    }
}

// ─────────────────────────────────────────────
// Resilience
// ─────────────────────────────────────────────

/// Retry, concurrency, and rate-limit settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    /// Total attempts per external call.
    pub retries: u32,
    pub initial_delay_secs: f64,
    /// Process-wide cap on concurrent external calls.
    pub max_concurrent_calls: usize,
    /// Requests allowed per actor within the window.
    pub rate_limit_count: usize,
    pub rate_limit_window_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay_secs: 1.0,
            max_concurrent_calls: 15,
            rate_limit_count: 15,
            rate_limit_window_secs: 60,
        }
    }
}

impl ResilienceConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_delay_secs.max(0.0))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

/// Where tenant settings, the blacklist, and usage history live.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.relaybot".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.data_dir)
    }

    /// One `<tenant>.json` settings file per tenant.
    pub fn tenants_dir(&self) -> PathBuf {
        self.data_path().join("tenants")
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.data_path().join("blacklist.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_path().join("tenant_history.json")
    }
}

// ─────────────────────────────────────────────
// Operator
// ─────────────────────────────────────────────

/// The single privileged actor who receives alerts and reports.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    pub id: String,
    /// Transport used to reach the operator directly.
    pub transport: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            transport: "console".to_string(),
        }
    }
}

impl OperatorConfig {
    pub fn is_configured(&self) -> bool {
        !self.id.is_empty()
    }
}

// ─────────────────────────────────────────────
// Schedule
// ─────────────────────────────────────────────

/// Local clock and recurring-job settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    /// Offset of local wall-clock time from UTC (9 = KST).
    pub utc_offset_hours: i32,
    /// Cron expression (sec min hour dom mon dow) for the daily usage report.
    pub report_cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            report_cron: "0 1 0 * * *".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> chrono::FixedOffset {
        crate::utils::fixed_offset(self.utc_offset_hours)
    }
}

// ─────────────────────────────────────────────
// Console transport
// ─────────────────────────────────────────────

/// Who the local console user is when talking to the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleConfig {
    pub actor_id: String,
    pub actor_name: String,
    /// Tenant the console speaks in; empty for direct messages.
    pub tenant_id: String,
    pub tenant_name: String,
    /// Chat channel lines are posted to until switched with `:channel`.
    pub channel_id: String,
    pub is_admin: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            actor_id: "console-user".to_string(),
            actor_name: "you".to_string(),
            tenant_id: "local".to_string(),
            tenant_name: "Local".to_string(),
            channel_id: "general".to_string(),
            is_admin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.resilience.retries, 3);
        assert_eq!(config.resilience.max_concurrent_calls, 15);
        assert_eq!(config.resilience.rate_limit_count, 15);
        assert_eq!(config.resilience.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.schedule.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_provider_api_base_fallback() {
        let mut provider = ProviderConfig::default();
        assert_eq!(provider.api_base(), DEFAULT_API_BASE);
        provider.api_base = Some("http://localhost:8080/v1".into());
        assert_eq!(provider.api_base(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: "/srv/relay".into(),
        };
        assert_eq!(storage.tenants_dir(), PathBuf::from("/srv/relay/tenants"));
        assert_eq!(storage.blacklist_path(), PathBuf::from("/srv/relay/blacklist.json"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"resilience": {"retries": 5}}"#).unwrap();
        assert_eq!(config.resilience.retries, 5);
        assert_eq!(config.resilience.initial_delay(), Duration::from_secs(1));
    }
}
