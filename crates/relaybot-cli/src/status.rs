//! `relaybot status`: show the effective configuration.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use relaybot_core::config::{get_config_path, load_config};

pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "💬 Relaybot Status".cyan().bold());
    println!();

    println!("  {:<14} {} {}", "Config:".bold(), config_path.display(), found(&config_path));
    let data = config.storage.data_path();
    println!("  {:<14} {} {}", "Data:".bold(), data.display(), found(&data));
    let tenants = count_tenants(&config.storage.tenants_dir());
    println!("  {:<14} {tenants} with settings", "Tenants:".bold());

    println!();
    println!("  {:<14} {}", "Assistant:".bold(), config.agent.name);
    println!(
        "  {:<14} {} {}",
        "Model:".bold(),
        config.agent.model,
        format!(
            "(temp {}, max_tokens {}, {} turns kept)",
            config.agent.temperature, config.agent.max_tokens, config.agent.max_turns
        )
        .dimmed()
    );
    println!("  {:<14} {}", "Translation:".bold(), config.translation.model);
    println!(
        "  {:<14} {} {}",
        "Provider:".bold(),
        config.provider.api_base(),
        key_status(config.provider.is_configured())
    );
    println!("  {:<14} {}", "Web search:".bold(), key_status(config.search.is_configured()));

    println!();
    let r = &config.resilience;
    println!(
        "  {:<14} {} attempts from {}s, {} concurrent calls",
        "Retry:".bold(),
        r.retries,
        r.initial_delay_secs,
        r.max_concurrent_calls
    );
    println!(
        "  {:<14} {} per {}s per actor",
        "Rate limit:".bold(),
        r.rate_limit_count,
        r.rate_limit_window_secs
    );
    println!(
        "  {:<14} UTC{:+}, report cron \"{}\"",
        "Schedule:".bold(),
        config.schedule.utc_offset_hours,
        config.schedule.report_cron
    );
    if config.operator.is_configured() {
        println!(
            "  {:<14} {} via {}",
            "Operator:".bold(),
            config.operator.id,
            config.operator.transport
        );
    } else {
        println!("  {:<14} {}", "Operator:".bold(), "· not configured".dimmed());
    }
    println!(
        "  {:<14} {} ({}) in #{}",
        "Console:".bold(),
        config.console.actor_name,
        config.console.actor_id,
        config.console.channel_id
    );
    println!();
    Ok(())
}

fn found(path: &Path) -> String {
    if path.exists() {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

fn key_status(configured: bool) -> String {
    if configured {
        format!("{} (key set)", "✓".green())
    } else {
        "· not configured".dimmed().to_string()
    }
}

/// Settings files under `dir`; zero when it does not exist yet.
fn count_tenants(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .count()
        })
        .unwrap_or(0)
}
