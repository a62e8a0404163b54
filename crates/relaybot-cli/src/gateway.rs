//! Gateway command: runs the relay end to end.
//!
//! Startup sequence:
//! 1. Load config and build the runtime (stores, provider, agent, dispatcher)
//! 2. Re-arm persisted reminders
//! 3. Spawn the inbound router, the daily usage report, and log forwarding
//! 4. Run the channel manager until Ctrl+C
//! 5. Stop the report, flush logs, abort reminder timers, stop the transports

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use relaybot_agent::InboundRouter;
use relaybot_core::config::load_config;
use relaybot_core::log_forward::LogForwarder;

use crate::helpers;
use crate::runtime::Runtime;

pub async fn run(logs: Arc<LogForwarder>) -> Result<()> {
    helpers::print_banner("gateway");

    let runtime = Runtime::build(load_config(None), logs)?;
    let config = &runtime.config;

    let restored = match runtime.scheduler.restore().await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "failed to restore reminders");
            0
        }
    };

    let report = Arc::new(runtime.daily_report()?);
    if runtime.operator.is_none() {
        warn!("no operator configured; usage reports and rate-limit alerts are disabled");
    }

    let router = Arc::new(InboundRouter::new(
        runtime.bus.clone(),
        runtime.dispatcher.clone(),
        runtime.relay.clone(),
    ));
    tokio::spawn(router.run());

    let report_task = {
        let report = report.clone();
        tokio::spawn(async move { report.run().await })
    };
    let log_task = runtime.spawn_log_forwarding();

    info!(
        model = %runtime.agent.model(),
        channels = ?runtime.channels.channel_names(),
        reminders = restored,
        "gateway starting"
    );

    println!("  Model:     {}", runtime.agent.model());
    println!("  Data:      {}", config.storage.data_path().display());
    println!("  Channels:  {}", runtime.channels.channel_names().join(", "));
    println!("  Reminders: {restored} armed");
    match report.next_run() {
        Some(next) => println!("  Report:    next at {}", next.format("%Y-%m-%d %H:%M")),
        None => println!("  Report:    not scheduled"),
    }
    println!(
        "  Console:   {} in #{} ({})",
        config.console.actor_name,
        config.console.channel_id,
        if config.console.tenant_id.is_empty() {
            "direct"
        } else {
            config.console.tenant_id.as_str()
        }
    );
    println!();
    println!("  Type messages or /commands. `:channel <id>` switches channel. Ctrl+C to stop.");
    println!();

    tokio::select! {
        result = runtime.channels.start_all() => {
            if let Err(e) = result {
                error!(error = %e, "channel manager error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
        }
    }

    report.stop();
    let _ = report_task.await;
    runtime.logs.stop();
    let _ = log_task.await;
    runtime.scheduler.shutdown();
    runtime.channels.stop_all().await;

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}
