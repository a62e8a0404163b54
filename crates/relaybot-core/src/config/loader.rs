//! Config loader: reads `~/.relaybot/config.json`, migrates legacy layouts,
//! and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.relaybot/config.json`
//! 3. Environment variables `RELAYBOT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Moves a multi-provider `providers.gemini` block to the single `provider` key.
fn migrate_config(raw: &mut serde_json::Value) {
    if raw.get("provider").is_some() {
        return;
    }
    let legacy = raw
        .get("providers")
        .and_then(|p| p.get("gemini"))
        .cloned();
    if let (Some(gemini), Some(obj)) = (legacy, raw.as_object_mut()) {
        obj.insert("provider".to_string(), gemini);
        debug!("Migrated providers.gemini → provider");
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("RELAYBOT_{key}")).ok()
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `RELAYBOT_<SECTION>__<FIELD>` (double underscore as delimiter),
/// e.g. `RELAYBOT_PROVIDER__API_KEY`, `RELAYBOT_SEARCH__ENGINE_ID`,
/// `RELAYBOT_OPERATOR__ID`, `RELAYBOT_RESILIENCE__RETRIES`.
fn apply_env_overrides(mut config: Config) -> Config {
    if let Some(v) = env_string("AGENT__MODEL") {
        config.agent.model = v;
    }
    if let Some(v) = env_parse("AGENT__MAX_TOKENS") {
        config.agent.max_tokens = v;
    }
    if let Some(v) = env_parse("AGENT__TEMPERATURE") {
        config.agent.temperature = v;
    }
    if let Some(v) = env_parse("AGENT__MAX_TURNS") {
        config.agent.max_turns = v;
    }
    if let Some(v) = env_string("TRANSLATION__MODEL") {
        config.translation.model = v;
    }

    if let Some(v) = env_string("PROVIDER__API_KEY") {
        config.provider.api_key = v;
    }
    if let Some(v) = env_string("PROVIDER__API_BASE") {
        config.provider.api_base = Some(v);
    }

    if let Some(v) = env_string("SEARCH__API_KEY") {
        config.search.api_key = v;
    }
    if let Some(v) = env_string("SEARCH__ENGINE_ID") {
        config.search.engine_id = v;
    }

    if let Some(v) = env_parse("RESILIENCE__RETRIES") {
        config.resilience.retries = v;
    }
    if let Some(v) = env_parse("RESILIENCE__MAX_CONCURRENT_CALLS") {
        config.resilience.max_concurrent_calls = v;
    }
    if let Some(v) = env_parse("RESILIENCE__RATE_LIMIT_COUNT") {
        config.resilience.rate_limit_count = v;
    }

    if let Some(v) = env_string("STORAGE__DATA_DIR") {
        config.storage.data_dir = v;
    }
    if let Some(v) = env_string("OPERATOR__ID") {
        config.operator.id = v;
    }
    if let Some(v) = env_string("OPERATOR__TRANSPORT") {
        config.operator.transport = v;
    }
    if let Some(v) = env_parse("SCHEDULE__UTC_OFFSET_HOURS") {
        config.schedule.utc_offset_hours = v;
    }
    if let Some(v) = env_string("SCHEDULE__REPORT_CRON") {
        config.schedule.report_cron = v;
    }
    if let Some(v) = env_string("CONSOLE__ACTOR_ID") {
        config.console.actor_id = v;
    }
    if let Some(v) = env_string("CONSOLE__TENANT_ID") {
        config.console.tenant_id = v;
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
