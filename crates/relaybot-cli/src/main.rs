//! Relaybot CLI entry point.
//!
//! # Commands
//!
//! - `relaybot gateway`: run the relay with the console transport
//! - `relaybot chat`: interactive REPL (questions and /commands)
//! - `relaybot ask <QUESTION>`: one question, one answer
//! - `relaybot onboard`: write the default config
//! - `relaybot status`: show the effective config
//! - `relaybot reminders list|remove`: manage persisted reminders

mod gateway;
mod helpers;
mod onboard;
mod reminders_cmd;
mod repl;
mod runtime;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::Rotation;

use relaybot_core::config::load_config;
use relaybot_core::log_forward::LogForwarder;
use relaybot_core::resilience::Backoff;

/// Filter for the log file and the forwarded log channel.
const PERSISTENT_LOG_FILTER: &str = "relaybot=info,warn";
/// Daily log files kept before the oldest is deleted.
const LOG_FILES_KEPT: usize = 30;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 💬 Relaybot: multi-tenant chat assistant, translator, and reminder bot
#[derive(Parser)]
#[command(name = "relaybot", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (router, reminders, daily report, console transport)
    Gateway,

    /// Chat with the assistant in an interactive REPL
    Chat,

    /// Ask a single question and print the answer
    Ask {
        question: String,

        /// Actor whose session the question belongs to
        #[arg(short, long)]
        actor: Option<String>,
    },

    /// Write the default config and create the data directory
    Onboard,

    /// Show the effective configuration
    Status,

    /// Manage persisted reminders
    Reminders {
        #[command(subcommand)]
        action: reminders_cmd::RemindersCommands,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logs = LogForwarder::new();

    match cli.command {
        Commands::Gateway => {
            let _guard = init_logging(cli.logs, cli.json_logs, &logs, Some(&log_dir()));
            gateway::run(logs).await
        }
        Commands::Chat => {
            let _guard = init_logging(cli.logs, cli.json_logs, &logs, Some(&log_dir()));
            let runtime = runtime::Runtime::build(load_config(None), logs)?;
            repl::run(runtime).await
        }
        Commands::Ask { question, actor } => {
            let _guard = init_logging(cli.logs, cli.json_logs, &logs, None);
            run_ask(&question, actor).await
        }
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run(),
        Commands::Reminders { action } => {
            let _guard = init_logging(cli.logs, cli.json_logs, &logs, None);
            reminders_cmd::dispatch(action).await
        }
    }
}

// ─────────────────────────────────────────────
// Ask command
// ─────────────────────────────────────────────

async fn run_ask(question: &str, actor: Option<String>) -> Result<()> {
    let config = load_config(None);
    let provider = runtime::build_provider(&config)?;
    let agent = runtime::build_agent_loop(&config, provider, Backoff::from_config(&config.resilience))?;

    let actor = actor.unwrap_or_else(|| config.console.actor_id.clone());
    info!(actor = %actor, "processing single question");

    helpers::print_thinking();
    let answer = agent.ask(&actor, question).await;
    helpers::clear_thinking();
    helpers::print_response(&config.agent.name, &answer);
    Ok(())
}

// ─────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────

fn log_dir() -> PathBuf {
    load_config(None).storage.data_path().join("logs")
}

/// Initialize tracing.
///
/// Stdout follows `RUST_LOG`, falling back to the `--logs` default. With a
/// `log_dir`, events also go to a daily-rotated `bot.<date>.log`. Every
/// command feeds `logs`, which forwards once a log channel is set.
///
/// The returned guard flushes the log file when dropped.
fn init_logging(verbose: bool, json: bool, logs: &Arc<LogForwarder>, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter, Layer};

    let default = if verbose { "relaybot=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stdout = if json {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().compact().with_target(false).boxed()
    };

    let (file, guard) = match log_dir.map(open_log_file).transpose() {
        Ok(Some((writer, guard))) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(PERSISTENT_LOG_FILTER));
            (Some(layer), Some(guard))
        }
        Ok(None) => (None, None),
        Err(e) => {
            eprintln!("File logging disabled: {e:#}");
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(stdout.with_filter(filter))
        .with(file)
        .with(logs.layer().with_filter(EnvFilter::new(PERSISTENT_LOG_FILTER)))
        .init();
    guard
}

/// A non-blocking writer to `dir/bot.<date>.log`, rotated at midnight.
fn open_log_file(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix("bot")
        .filename_suffix("log")
        .max_log_files(LOG_FILES_KEPT)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relaybot", "ask", "what time is it?", "--logs", "--actor", "u7"]).unwrap();
        assert!(cli.logs);
        assert!(!cli.json_logs);
        match cli.command {
            Commands::Ask { question, actor } => {
                assert_eq!(question, "what time is it?");
                assert_eq!(actor.as_deref(), Some("u7"));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn log_file_is_created_under_log_dir() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let (mut writer, guard) = open_log_file(&logs).unwrap();
        writer.write_all(b"gateway starting\n").unwrap();
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("bot.") && names[0].ends_with(".log"));
        let content = std::fs::read_to_string(logs.join(&names[0])).unwrap();
        assert!(content.contains("gateway starting"));
    }

    #[test]
    fn parses_reminder_removal() {
        let cli = Cli::try_parse_from(["relaybot", "reminders", "remove", "g1", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reminders {
                action: reminders_cmd::RemindersCommands::Remove { index: 2, .. }
            }
        ));
    }
}
