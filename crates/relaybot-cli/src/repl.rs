//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Slash commands go through the command dispatcher as the configured
//! console identity; anything else is a question for the assistant.

use anyhow::Result;
use chrono::Utc;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use relaybot_agent::CommandContext;
use relaybot_channels::CONSOLE_TRANSPORT;
use relaybot_core::config::schema::ConsoleConfig;

use crate::helpers;
use crate::runtime::Runtime;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", ":quit", ":q"];

/// Run the interactive REPL loop.
pub async fn run(runtime: Runtime) -> Result<()> {
    helpers::print_banner("chat");
    println!("  Type a question, a /command (try /help), or \"exit\" to quit.");
    println!();

    let mut editor = create_editor(&runtime)?;
    let log_task = runtime.spawn_log_forwarding();
    let identity = runtime.config.console.clone();
    let name = runtime.config.agent.name.clone();

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\nGoodbye! 👋");
            break;
        }
        let _ = editor.add_history_entry(&input);

        if trimmed.starts_with('/') {
            let ctx = console_context(&identity);
            debug!(actor = %ctx.actor_id, command = trimmed, "REPL command");
            helpers::print_thinking();
            let reply = runtime.dispatcher.handle_line(&ctx, trimmed).await;
            helpers::clear_thinking();
            match reply {
                Some(reply) => helpers::print_reply(&reply),
                None => println!("(no reply)"),
            }
        } else {
            debug!(actor = %identity.actor_id, "REPL question");
            helpers::print_thinking();
            let answer = runtime.agent.ask(&identity.actor_id, trimmed).await;
            helpers::clear_thinking();
            helpers::print_response(&name, &answer);
        }
    }

    runtime.scheduler.shutdown();
    runtime.logs.stop();
    let _ = log_task.await;
    save_history(&runtime, &mut editor);
    Ok(())
}

/// The console identity as a command issuer, stamped now.
fn console_context(identity: &ConsoleConfig) -> CommandContext {
    let tenant = (!identity.tenant_id.is_empty()).then(|| identity.tenant_id.clone());
    CommandContext {
        actor_id: identity.actor_id.clone(),
        actor_name: identity.actor_name.clone(),
        tenant_name: tenant.as_ref().map(|_| identity.tenant_name.clone()),
        tenant_id: tenant,
        channel_id: identity.channel_id.clone(),
        transport: CONSOLE_TRANSPORT.to_string(),
        is_admin: identity.is_admin,
        received_at: Utc::now(),
    }
}

/// Create a rustyline editor with history.
fn create_editor(runtime: &Runtime) -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let path = history_path(runtime);
    if path.exists() {
        let _ = editor.load_history(&path);
        debug!("loaded REPL history from {}", path.display());
    }
    Ok(editor)
}

fn save_history(runtime: &Runtime, editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path(runtime);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn history_path(runtime: &Runtime) -> std::path::PathBuf {
    runtime.config.storage.data_path().join("history").join("cli_history")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
