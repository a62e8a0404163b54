//! `relaybot onboard`: write the default config and create the data layout.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use relaybot_core::config::{get_config_path, load_config, save_config, Config};

pub fn run() -> Result<()> {
    println!();
    println!("{}", "💬 Relaybot Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    if write_config(&config_path, &Config::default())? {
        println!("  {} created config at {}", "✓".green(), config_path.display());
    } else {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    }

    let config = load_config(None);
    for dir in [config.storage.data_path(), config.storage.tenants_dir()] {
        std::fs::create_dir_all(&dir)?;
        println!("  {} {}", "✓".green(), dir.display());
    }

    println!();
    if !config.provider.is_configured() {
        println!(
            "  {} set {} in the config (or {}) before running.",
            "!".yellow(),
            "provider.apiKey".bold(),
            "RELAYBOT_PROVIDER__API_KEY".bold()
        );
    }
    if !config.search.is_configured() {
        println!(
            "  {} set {} and {} to let the assistant search the web.",
            "!".yellow(),
            "search.apiKey".bold(),
            "search.engineId".bold()
        );
    }
    if !config.operator.is_configured() {
        println!(
            "  {} set {} to receive usage reports and rate-limit alerts.",
            "!".yellow(),
            "operator.id".bold()
        );
    }
    println!();
    println!(
        "{}",
        "  Setup complete! Run `relaybot chat` or `relaybot gateway` to start.".green()
    );
    println!();
    Ok(())
}

/// Write `config` to `path` unless a file is already there.
fn write_config(path: &Path, config: &Config) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(config, Some(path))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_config_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(write_config(&path, &Config::default()).unwrap());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["agent"]["maxTurns"], 5);
        assert_eq!(written["schedule"]["utcOffsetHours"], 9);
        assert_eq!(written["console"]["actorId"], "console-user");
    }

    #[test]
    fn write_config_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{\"agent\":{}}").unwrap();
        assert!(!write_config(&path, &Config::default()).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"agent\":{}}");
    }
}
