//! `relaybot reminders`: inspect and remove persisted reminders.
//!
//! - `relaybot reminders list [--tenant ID]`: reminders per tenant
//! - `relaybot reminders remove <TENANT> <INDEX>`: drop one by its list number
//!
//! A running gateway keeps its armed timers; restart it after removing.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use relaybot_channels::{ChannelRouter, CONSOLE_TRANSPORT};
use relaybot_core::config::{load_config, Config};
use relaybot_core::store::{Reminder, TenantStore};
use relaybot_core::utils::truncate_string;
use relaybot_cron::{ReminderScheduler, SystemClock};

// ─────────────────────────────────────────────
// Subcommand enum
// ─────────────────────────────────────────────

#[derive(Subcommand)]
pub enum RemindersCommands {
    /// List reminders
    List {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },

    /// Remove a reminder by tenant and list number
    Remove {
        tenant: String,
        /// 1-based number shown by `list`
        index: usize,
    },
}

pub async fn dispatch(cmd: RemindersCommands) -> Result<()> {
    let config = load_config(None);
    let tenants = Arc::new(TenantStore::new(config.storage.tenants_dir()).context("failed to open tenant settings")?);
    match cmd {
        RemindersCommands::List { tenant } => list(&tenants, tenant.as_deref()),
        RemindersCommands::Remove { tenant, index } => remove(&config, tenants, &tenant, index).await,
    }
}

// ─────────────────────────────────────────────
// Command implementations
// ─────────────────────────────────────────────

fn list(tenants: &TenantStore, only: Option<&str>) -> Result<()> {
    let ids = match only {
        Some(id) => vec![id.to_string()],
        None => tenants.tenant_ids()?,
    };

    let mut shown = 0;
    for id in ids {
        let reminders = tenants.load(&id)?.reminders;
        if reminders.is_empty() {
            continue;
        }
        shown += reminders.len();

        println!();
        println!("  {}", format!("Tenant {id}").cyan().bold());
        println!(
            "  {:<4} {:<10} {:<8} {:<18} {:<14} {}",
            "#".bold(),
            "ID".bold(),
            "Repeat".bold(),
            "Time".bold(),
            "Channel".bold(),
            "Message".bold(),
        );
        println!("  {}", "─".repeat(76));
        for (i, r) in reminders.iter().enumerate() {
            println!("  {}", format_row(i + 1, r));
        }
    }

    if shown == 0 {
        println!("  No reminders.");
    }
    println!();
    Ok(())
}

async fn remove(config: &Config, tenants: Arc<TenantStore>, tenant: &str, index: usize) -> Result<()> {
    let scheduler = ReminderScheduler::new(
        tenants,
        Arc::new(ChannelRouter::new()),
        CONSOLE_TRANSPORT,
        config.schedule.offset(),
        Arc::new(SystemClock),
    );

    match scheduler.cancel(tenant, index).await? {
        Some(r) => println!(
            "  {} Removed reminder {} ({} '{}')",
            "✓".green(),
            r.id.cyan(),
            r.display_time(),
            r.message
        ),
        None => println!("  {} Tenant {} has no reminder #{}", "✗".red(), tenant, index),
    }
    Ok(())
}

fn format_row(number: usize, r: &Reminder) -> String {
    format!(
        "{:<4} {:<10} {:<8} {:<18} {:<14} {}",
        number,
        r.id,
        r.recurrence.to_string(),
        r.display_time(),
        format!("#{}", r.channel_id),
        truncate_string(&r.message, 40)
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
