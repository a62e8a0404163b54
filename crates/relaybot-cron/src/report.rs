//! Daily usage report job.
//!
//! Fires on a cron expression in the configured local offset and sends the
//! previous day's per-tenant command counts to the operator.

use std::sync::Arc;

use chrono::{Days, FixedOffset};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use relaybot_core::bus::OperatorContact;
use relaybot_core::store::UsageTracker;
use relaybot_core::utils::{chunk_text, MESSAGE_CHUNK_LIMIT};

use crate::clock::Clock;

pub struct DailyReport {
    usage: Arc<UsageTracker>,
    operator: Option<OperatorContact>,
    schedule: cron::Schedule,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    shutdown: Notify,
}

impl DailyReport {
    /// Build the job; fails when `expr` is not a valid cron expression.
    pub fn new(
        usage: Arc<UsageTracker>,
        operator: Option<OperatorContact>,
        expr: &str,
        offset: FixedOffset,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let schedule: cron::Schedule = expr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid report schedule '{expr}': {e}"))?;
        Ok(Self {
            usage,
            operator,
            schedule,
            offset,
            clock,
            shutdown: Notify::new(),
        })
    }

    /// Next firing time in local time.
    pub fn next_run(&self) -> Option<chrono::DateTime<FixedOffset>> {
        let now = self.clock.now().with_timezone(&self.offset);
        self.schedule.after(&now).next()
    }

    /// Drain the counters and send the report now.
    ///
    /// Returns `false` when there was nothing to report or no operator.
    pub async fn send_now(&self) -> anyhow::Result<bool> {
        let today = self.clock.now().with_timezone(&self.offset).date_naive();
        let label = today
            .checked_sub_days(Days::new(1))
            .unwrap_or(today)
            .format("%Y-%m-%d")
            .to_string();

        let Some(operator) = &self.operator else {
            debug!("No operator configured, skipping usage report");
            return Ok(false);
        };
        let Some(report) = self.usage.take_report(&label) else {
            info!(date = %label, "No usage recorded, report skipped");
            return Ok(false);
        };

        for chunk in chunk_text(&report, MESSAGE_CHUNK_LIMIT) {
            operator.notify(chunk).await?;
        }
        info!(date = %label, "Daily usage report sent");
        Ok(true)
    }

    /// Run until [`DailyReport::stop`] is called.
    pub async fn run(&self) {
        info!("Daily report job started");
        loop {
            let Some(next) = self.next_run() else {
                warn!("Report schedule has no upcoming run, stopping");
                return;
            };
            let wait = (next.with_timezone(&chrono::Utc) - self.clock.now())
                .to_std()
                .unwrap_or_default();
            debug!(next = %next, "Next usage report");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.send_now().await {
                        warn!(error = %e, "Failed to send usage report");
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Daily report job stopped");
                    return;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}
