//! Daily command usage counters and the tenant first-seen history.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::LOCAL_TIME_FORMAT;

/// First sighting of a tenant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TenantHistory {
    pub name: String,
    pub first_seen: String,
}

#[derive(Debug, Default)]
struct TenantUsage {
    name: String,
    commands: HashMap<String, u64>,
}

impl TenantUsage {
    fn total(&self) -> u64 {
        self.commands.values().sum()
    }
}

/// Counts command invocations per tenant until the next report drains them.
pub struct UsageTracker {
    counts: Mutex<HashMap<String, TenantUsage>>,
    history_path: PathBuf,
    history: Mutex<BTreeMap<String, TenantHistory>>,
}

impl UsageTracker {
    /// Open the tracker, loading any existing tenant history.
    pub fn open(history_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let history_path = history_path.into();
        let history = if history_path.exists() {
            let content = std::fs::read_to_string(&history_path)
                .with_context(|| format!("reading {}", history_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", history_path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(UsageTracker {
            counts: Mutex::new(HashMap::new()),
            history_path,
            history: Mutex::new(history),
        })
    }

    /// Count one command invocation within a tenant.
    ///
    /// The first time a tenant is seen its name and timestamp are persisted.
    pub fn record(
        &self,
        tenant_id: &str,
        tenant_name: &str,
        command: &str,
        now: DateTime<FixedOffset>,
    ) -> anyhow::Result<()> {
        {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let usage = counts.entry(tenant_id.to_string()).or_default();
            usage.name = tenant_name.to_string();
            *usage.commands.entry(command.to_string()).or_insert(0) += 1;
        }

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.contains_key(tenant_id) {
            return Ok(());
        }
        history.insert(
            tenant_id.to_string(),
            TenantHistory {
                name: tenant_name.to_string(),
                first_seen: now.format(LOCAL_TIME_FORMAT).to_string(),
            },
        );
        if let Some(parent) = self.history_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.history_path, serde_json::to_string_pretty(&*history)?)
            .with_context(|| format!("writing {}", self.history_path.display()))?;
        info!(tenant = %tenant_id, name = %tenant_name, "New tenant recorded");
        Ok(())
    }

    /// Count for one command in one tenant since the last drain.
    pub fn count(&self, tenant_id: &str, command: &str) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts
            .get(tenant_id)
            .and_then(|u| u.commands.get(command))
            .copied()
            .unwrap_or(0)
    }

    /// Every tenant ever seen, by id.
    pub fn known_tenants(&self) -> BTreeMap<String, TenantHistory> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the counters and render them as a report.
    ///
    /// Returns `None` when nothing was used since the last drain.
    pub fn take_report(&self, date_label: &str) -> Option<String> {
        let drained: HashMap<String, TenantUsage> = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *counts)
        };
        if drained.is_empty() {
            debug!("No usage to report");
            return None;
        }

        let mut tenants: Vec<(String, TenantUsage)> = drained.into_iter().collect();
        tenants.sort_by_key(|(id, usage)| (Reverse(usage.total()), id.clone()));

        let mut report = format!("📊 **Daily usage report for {date_label}**\n\n");
        for (id, usage) in &tenants {
            let _ = writeln!(report, "**[{}]** ({id}) total {}", usage.name, usage.total());
            let mut commands: Vec<(&String, &u64)> = usage.commands.iter().collect();
            commands.sort_by_key(|(name, count)| (Reverse(**count), (*name).clone()));
            for (name, count) in commands {
                let _ = writeln!(report, "- `/{name}`: {count}");
            }
            report.push('\n');
        }
        Some(report.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_record_counts_per_command() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UsageTracker::open(dir.path().join("h.json")).unwrap();

        tracker.record("g1", "Guild", "ask", now()).unwrap();
        tracker.record("g1", "Guild", "ask", now()).unwrap();
        tracker.record("g1", "Guild", "ping", now()).unwrap();

        assert_eq!(tracker.count("g1", "ask"), 2);
        assert_eq!(tracker.count("g1", "ping"), 1);
        assert_eq!(tracker.count("g2", "ask"), 0);
    }

    #[test]
    fn test_first_seen_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        let tracker = UsageTracker::open(&path).unwrap();

        tracker.record("g1", "Guild", "ask", now()).unwrap();
        let later = now() + chrono::Duration::days(1);
        tracker.record("g1", "Renamed", "ask", later).unwrap();

        let reopened = UsageTracker::open(&path).unwrap();
        let history = reopened.known_tenants();
        assert_eq!(history["g1"].name, "Guild");
        assert_eq!(history["g1"].first_seen, "2026-03-01 12:00:00");
    }

    #[test]
    fn test_report_sorted_and_drained() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UsageTracker::open(dir.path().join("h.json")).unwrap();

        tracker.record("small", "Small", "ping", now()).unwrap();
        for _ in 0..3 {
            tracker.record("big", "Big", "ask", now()).unwrap();
        }
        tracker.record("big", "Big", "help", now()).unwrap();

        let report = tracker.take_report("2026-03-01").unwrap();
        let big = report.find("[Big]").unwrap();
        let small = report.find("[Small]").unwrap();
        assert!(big < small);
        assert!(report.contains("total 4"));
        assert!(report.find("`/ask`: 3").unwrap() < report.find("`/help`: 1").unwrap());

        assert!(tracker.take_report("2026-03-02").is_none());
        assert_eq!(tracker.count("big", "ask"), 0);
    }
}
