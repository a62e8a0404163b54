//! Reminder scheduler: one cancellable timer task per persisted reminder.
//!
//! Architecture:
//! - Reminders live in each tenant's settings file (`reminders` list)
//! - Every reminder has a timer task; its abort handle is kept in a registry
//!   keyed by reminder id
//! - On fire: deliver to the recorded channel, fall back to a direct message
//!   to the owner, then advance (daily) or remove (once) the persisted entry
//! - On startup `restore` re-arms everything, rolling stale daily reminders
//!   forward

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use chrono::{Duration, FixedOffset, NaiveDateTime};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use relaybot_core::bus::{Delivery, OutboundMessage};
use relaybot_core::store::{new_reminder_id, Recurrence, Reminder, TenantStore};

use crate::clock::Clock;
use crate::when::roll_forward_daily;

// ─────────────────────────────────────────────
// ReminderScheduler
// ─────────────────────────────────────────────

/// Schedules, fires, and cancels reminders.
///
/// Cheap to clone; all clones share one timer registry.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    tenants: Arc<TenantStore>,
    delivery: Arc<dyn Delivery>,
    /// Transport reminders are delivered on.
    transport: String,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    timers: std::sync::Mutex<HashMap<String, AbortHandle>>,
}

impl ReminderScheduler {
    pub fn new(
        tenants: Arc<TenantStore>,
        delivery: Arc<dyn Delivery>,
        transport: impl Into<String>,
        offset: FixedOffset,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tenants,
                delivery,
                transport: transport.into(),
                offset,
                clock,
                timers: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Current local wall-clock time.
    pub fn now_local(&self) -> NaiveDateTime {
        self.inner.now_local()
    }

    pub fn offset(&self) -> FixedOffset {
        self.inner.offset
    }

    /// Persist a reminder and arm its timer.
    pub async fn add(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        let stored = reminder.clone();
        self.inner
            .tenants
            .update(&reminder.tenant_id, move |s| s.reminders.push(stored))
            .await?;
        info!(
            id = %reminder.id,
            tenant = %reminder.tenant_id,
            recurrence = %reminder.recurrence,
            time = %reminder.time,
            "Reminder scheduled"
        );
        self.inner.arm(reminder.clone());
        Ok(reminder)
    }

    /// A tenant's reminders in stored order.
    pub fn list(&self, tenant_id: &str) -> anyhow::Result<Vec<Reminder>> {
        Ok(self.inner.tenants.load(tenant_id)?.reminders)
    }

    /// Remove the reminder at 1-based `index` and abort its timer.
    ///
    /// Returns `None` when the index is out of range.
    pub async fn cancel(&self, tenant_id: &str, index: usize) -> anyhow::Result<Option<Reminder>> {
        let removed = self
            .inner
            .tenants
            .update(tenant_id, |s| {
                if index == 0 || index > s.reminders.len() {
                    None
                } else {
                    Some(s.reminders.remove(index - 1))
                }
            })
            .await?;

        if let Some(ref r) = removed {
            self.inner.disarm(&r.id);
            info!(id = %r.id, tenant = %tenant_id, "Reminder cancelled");
        }
        Ok(removed)
    }

    /// Re-arm every persisted reminder after a restart.
    ///
    /// Missing ids are assigned and stale daily reminders are rolled forward
    /// to their next occurrence. Past-due one-off reminders fire immediately.
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let now = self.now_local();
        let mut armed = 0;

        for tenant_id in self.inner.tenants.tenant_ids()? {
            let restored = self
                .inner
                .tenants
                .update(&tenant_id, |s| {
                    for r in &mut s.reminders {
                        if r.id.is_empty() {
                            r.id = new_reminder_id();
                        }
                        if r.recurrence == Recurrence::Daily {
                            r.time = roll_forward_daily(r.time, now);
                        }
                    }
                    s.reminders.clone()
                })
                .await;

            match restored {
                Ok(reminders) => {
                    for r in reminders {
                        debug!(id = %r.id, tenant = %tenant_id, time = %r.time, "Restoring reminder");
                        self.inner.arm(r);
                        armed += 1;
                    }
                }
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "Failed to restore reminders");
                }
            }
        }

        info!(count = armed, "Reminders restored");
        Ok(armed)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.inner.lock_timers().len()
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.inner.lock_timers().contains_key(id)
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        let mut timers = self.inner.lock_timers();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        info!("Reminder scheduler stopped");
    }
}

impl Inner {
    fn now_local(&self) -> NaiveDateTime {
        self.clock.now().with_timezone(&self.offset).naive_local()
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, AbortHandle>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the timer and register its handle under one lock, so the
    /// task cannot unregister itself before it is registered.
    fn arm(self: &Arc<Self>, reminder: Reminder) {
        let id = reminder.id.clone();
        let mut timers = self.lock_timers();
        let task = tokio::spawn(run_timer(self.clone(), reminder));
        if let Some(previous) = timers.insert(id, task.abort_handle()) {
            previous.abort();
        }
    }

    /// Drop the registry entry for `id` if it still belongs to `task`.
    fn release(&self, id: &str, task: tokio::task::Id) {
        let mut timers = self.lock_timers();
        if timers.get(id).is_some_and(|h| h.id() == task) {
            timers.remove(id);
        }
    }

    fn disarm(&self, id: &str) {
        if let Some(handle) = self.lock_timers().remove(id) {
            handle.abort();
        }
    }

    /// Deliver to the channel, falling back to a direct message to the owner.
    async fn deliver(&self, r: &Reminder) {
        let text = format!("⏰ @{}, it's time! '{}'", r.owner_id, r.message);
        let msg = OutboundMessage::new(&self.transport, &r.channel_id, text);
        let Err(e) = self.delivery.deliver(&msg).await else {
            info!(id = %r.id, channel = %r.channel_id, "Reminder delivered");
            return;
        };

        warn!(id = %r.id, channel = %r.channel_id, error = %e, "Channel delivery failed, sending DM");
        let dm = OutboundMessage::direct(
            &self.transport,
            &r.owner_id,
            format!("⏰ [{}] reminder: '{}'", r.tenant_id, r.message),
        );
        match self.delivery.deliver(&dm).await {
            Ok(()) => info!(id = %r.id, owner = %r.owner_id, "Reminder delivered by DM"),
            Err(e) => error!(id = %r.id, owner = %r.owner_id, error = %e, "Reminder could not be delivered"),
        }
    }

    /// Advance or remove the persisted entry after firing.
    async fn complete(self: &Arc<Self>, fired: Reminder) {
        match fired.recurrence {
            Recurrence::Daily => {
                let next_time = fired.time + Duration::days(1);
                let id = fired.id.clone();
                let updated = self
                    .tenants
                    .update(&fired.tenant_id, move |s| {
                        s.reminders.iter_mut().find(|r| r.id == id).map(|r| {
                            r.time = next_time;
                            r.clone()
                        })
                    })
                    .await;
                match updated {
                    Ok(Some(next)) => {
                        debug!(id = %next.id, time = %next.time, "Daily reminder advanced");
                        self.arm(next);
                    }
                    Ok(None) => debug!(id = %fired.id, "Reminder cancelled while firing"),
                    Err(e) => {
                        error!(id = %fired.id, error = %e, "Failed to persist daily reminder, keeping it in memory");
                        self.arm(Reminder {
                            time: next_time,
                            ..fired
                        });
                    }
                }
            }
            Recurrence::Once => {
                let id = fired.id.clone();
                let result = self
                    .tenants
                    .update(&fired.tenant_id, move |s| s.reminders.retain(|r| r.id != id))
                    .await;
                if let Err(e) = result {
                    error!(id = %fired.id, error = %e, "Failed to remove fired reminder");
                }
            }
        }
    }
}

async fn run_timer(inner: Arc<Inner>, reminder: Reminder) {
    let fire_at = reminder.fire_at(inner.offset);
    let wait = (fire_at - inner.clock.now()).to_std().unwrap_or_default();
    debug!(id = %reminder.id, wait_secs = wait.as_secs(), "Reminder armed");
    tokio::time::sleep(wait).await;

    inner.release(&reminder.id, tokio::task::id());
    inner.deliver(&reminder).await;
    inner.complete(reminder).await;
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use relaybot_core::store::TenantSettings;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Recorder {
        sent: Mutex<Vec<OutboundMessage>>,
        fail_channels: bool,
    }

    impl Recorder {
        fn new(fail_channels: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail_channels,
            })
        }

        fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Delivery for Recorder {
        async fn deliver(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
            if self.fail_channels && !msg.direct {
                anyhow::bail!("missing access to channel");
            }
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    const KST: i32 = 9 * 3600;

    /// 2026-03-01 12:00:00 KST.
    fn origin() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap()
    }

    fn setup(dir: &TempDir, recorder: Arc<Recorder>) -> (ReminderScheduler, Arc<TenantStore>) {
        let tenants = Arc::new(TenantStore::new(dir.path()).unwrap());
        let scheduler = ReminderScheduler::new(
            tenants.clone(),
            recorder,
            "console",
            FixedOffset::east_opt(KST).unwrap(),
            Arc::new(TokioClock::starting_at(origin())),
        );
        (scheduler, tenants)
    }

    fn in_minutes(s: &ReminderScheduler, minutes: i64) -> NaiveDateTime {
        s.now_local() + Duration::minutes(minutes)
    }

    fn secs(n: u64) -> std::time::Duration {
        std::time::Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_reminder_fires_once_and_is_removed() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let (scheduler, tenants) = setup(&dir, recorder.clone());

        let at = in_minutes(&scheduler, 5);
        scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Once, at, "stretch"))
            .await
            .unwrap();
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(secs(5 * 60 + 1)).await;

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, "c1");
        assert!(sent[0].content.contains("stretch"));
        assert!(tenants.load("g1").unwrap().reminders.is_empty());
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(secs(86_400)).await;
        assert_eq!(recorder.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_reminder_advances_each_firing() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let (scheduler, tenants) = setup(&dir, recorder.clone());

        let at = in_minutes(&scheduler, 5);
        scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Daily, at, "standup"))
            .await
            .unwrap();

        tokio::time::sleep(secs(5 * 60 + 1)).await;
        assert_eq!(recorder.sent().len(), 1);
        let stored = tenants.load("g1").unwrap().reminders;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].time, at + Duration::days(1));

        tokio::time::sleep(secs(86_400)).await;
        assert_eq!(recorder.sent().len(), 2);
        assert_eq!(tenants.load("g1").unwrap().reminders[0].time, at + Duration::days(2));
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_failure_falls_back_to_dm() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(true);
        let (scheduler, _) = setup(&dir, recorder.clone());

        let at = in_minutes(&scheduler, 1);
        scheduler
            .add(Reminder::new("owner-7", "g1", "c1", Recurrence::Once, at, "call mom"))
            .await
            .unwrap();

        tokio::time::sleep(secs(61)).await;

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].direct);
        assert_eq!(sent[0].chat_id, "owner-7");
        assert!(sent[0].content.contains("[g1]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_entry_and_timer() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let (scheduler, tenants) = setup(&dir, recorder.clone());

        let first = scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Once, in_minutes(&scheduler, 5), "first"))
            .await
            .unwrap();
        scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Daily, in_minutes(&scheduler, 10), "second"))
            .await
            .unwrap();

        let cancelled = scheduler.cancel("g1", 1).await.unwrap().unwrap();
        assert_eq!(cancelled.id, first.id);
        assert!(!scheduler.is_armed(&first.id));
        assert_eq!(tenants.load("g1").unwrap().reminders.len(), 1);

        tokio::time::sleep(secs(11 * 60)).await;
        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_out_of_range() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _) = setup(&dir, Recorder::new(false));
        scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Once, in_minutes(&scheduler, 5), "x"))
            .await
            .unwrap();

        assert!(scheduler.cancel("g1", 0).await.unwrap().is_none());
        assert!(scheduler.cancel("g1", 2).await.unwrap().is_none());
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_rolls_daily_forward_and_fires_overdue_once() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let (scheduler, tenants) = setup(&dir, recorder.clone());

        let now = scheduler.now_local();
        let stale_daily = Reminder {
            id: String::new(),
            ..Reminder::new("u1", "g1", "c1", Recurrence::Daily, now - Duration::days(3), "daily")
        };
        let overdue_once =
            Reminder::new("u2", "g1", "c1", Recurrence::Once, now - Duration::hours(2), "late");
        tenants
            .save(
                "g1",
                &TenantSettings {
                    reminders: vec![stale_daily, overdue_once],
                    ..TenantSettings::default()
                },
            )
            .unwrap();

        assert_eq!(scheduler.restore().await.unwrap(), 2);

        let stored = tenants.load("g1").unwrap().reminders;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id.len(), 8);
        assert_eq!(stored[0].time, now);

        tokio::time::sleep(secs(1)).await;
        let sent = recorder.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|m| m.content.contains("late")));

        let stored = tenants.load("g1").unwrap().reminders;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].recurrence, Recurrence::Daily);
        assert_eq!(stored[0].time, now + Duration::days(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overdue_restore_leaves_no_stale_timers() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let tenants = Arc::new(TenantStore::new(dir.path()).unwrap());
        let scheduler = ReminderScheduler::new(
            tenants.clone(),
            recorder.clone(),
            "console",
            FixedOffset::east_opt(KST).unwrap(),
            Arc::new(crate::clock::SystemClock),
        );

        let now = scheduler.now_local();
        for t in 0..20 {
            let reminders = (0..10)
                .map(|i| {
                    let at = now - Duration::minutes(i + 1);
                    Reminder::new("u1", &format!("g{t}"), "c1", Recurrence::Once, at, "late")
                })
                .collect();
            tenants
                .save(
                    &format!("g{t}"),
                    &TenantSettings {
                        reminders,
                        ..TenantSettings::default()
                    },
                )
                .unwrap();
        }

        assert_eq!(scheduler.restore().await.unwrap(), 200);

        let deadline = tokio::time::Instant::now() + secs(10);
        while recorder.sent().len() < 200 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(recorder.sent().len(), 200);

        let deadline = tokio::time::Instant::now() + secs(10);
        while scheduler.pending() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(scheduler.pending(), 0);
        for t in 0..20 {
            assert!(tenants.load(&format!("g{t}")).unwrap().reminders.is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overdue_daily_stays_armed_after_firing() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let tenants = Arc::new(TenantStore::new(dir.path()).unwrap());
        let scheduler = ReminderScheduler::new(
            tenants.clone(),
            recorder.clone(),
            "console",
            FixedOffset::east_opt(KST).unwrap(),
            Arc::new(crate::clock::SystemClock),
        );

        let mut ids = Vec::new();
        for i in 0..50 {
            let r = Reminder::new("u1", "g1", "c1", Recurrence::Daily, scheduler.now_local(), format!("d{i}"));
            ids.push(r.id.clone());
            scheduler.add(r).await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + secs(10);
        while recorder.sent().len() < 50 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(recorder.sent().len(), 50);

        let deadline = tokio::time::Instant::now() + secs(10);
        while ids.iter().any(|id| !scheduler.is_armed(id)) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(ids.iter().all(|id| scheduler.is_armed(id)));
        assert_eq!(scheduler.pending(), 50);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_all_timers() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(false);
        let (scheduler, _) = setup(&dir, recorder.clone());

        scheduler
            .add(Reminder::new("u1", "g1", "c1", Recurrence::Once, in_minutes(&scheduler, 1), "x"))
            .await
            .unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(secs(120)).await;
        assert!(recorder.sent().is_empty());
    }
}
