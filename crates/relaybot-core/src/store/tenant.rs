//! Per-tenant settings, persisted as one JSON file per tenant.
//!
//! File format: `<data_dir>/tenants/{safe_tenant_id}.json`
//! ```json
//! {"source_channels": [], "translation_channel": null, "target_language": "ko", "reminders": []}
//! ```
//!
//! Older files store channel and user ids as integers and name the
//! recurrence `"1번"`/`"매일"`; both load unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::{safe_filename, LOCAL_TIME_FORMAT};

// ─────────────────────────────────────────────
// Reminder record
// ─────────────────────────────────────────────

/// How often a reminder fires.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[serde(alias = "1번")]
    Once,
    #[serde(alias = "매일")]
    Daily,
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::Once => write!(f, "once"),
            Recurrence::Daily => write!(f, "daily"),
        }
    }
}

/// A persisted reminder. `time` is local wall-clock time in the configured offset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    /// Empty on records written before ids existed; assigned on restore.
    #[serde(default)]
    pub id: String,
    #[serde(alias = "user_id", deserialize_with = "flexible_id::one")]
    pub owner_id: String,
    #[serde(alias = "guild_id", deserialize_with = "flexible_id::one")]
    pub tenant_id: String,
    #[serde(deserialize_with = "flexible_id::one")]
    pub channel_id: String,
    #[serde(alias = "frequency")]
    pub recurrence: Recurrence,
    #[serde(with = "local_time")]
    pub time: NaiveDateTime,
    pub message: String,
}

impl Reminder {
    pub fn new(
        owner_id: impl Into<String>,
        tenant_id: impl Into<String>,
        channel_id: impl Into<String>,
        recurrence: Recurrence,
        time: NaiveDateTime,
        message: impl Into<String>,
    ) -> Self {
        Reminder {
            id: new_reminder_id(),
            owner_id: owner_id.into(),
            tenant_id: tenant_id.into(),
            channel_id: channel_id.into(),
            recurrence,
            time,
            message: message.into(),
        }
    }

    /// The fire time as an absolute instant.
    pub fn fire_at(&self, offset: FixedOffset) -> DateTime<Utc> {
        offset
            .from_local_datetime(&self.time)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&self.time))
    }

    pub fn display_time(&self) -> String {
        self.time.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Generate a short reminder id.
pub fn new_reminder_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

mod local_time {
    use super::LOCAL_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(LOCAL_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, LOCAL_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Ids written either as JSON strings or as integers.
mod flexible_id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Text(s) => s,
                RawId::Unsigned(n) => n.to_string(),
                RawId::Signed(n) => n.to_string(),
            }
        }
    }

    pub fn one<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        RawId::deserialize(d).map(String::from)
    }

    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<RawId>::deserialize(d)?.map(String::from))
    }

    pub fn list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(Vec::<RawId>::deserialize(d)?
            .into_iter()
            .map(String::from)
            .collect())
    }
}

// ─────────────────────────────────────────────
// Tenant settings
// ─────────────────────────────────────────────

/// Settings scoped to one tenant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TenantSettings {
    #[serde(default, deserialize_with = "flexible_id::list")]
    pub source_channels: Vec<String>,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub translation_channel: Option<String>,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

fn default_target_language() -> String {
    "ko".to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        TenantSettings {
            source_channels: Vec::new(),
            translation_channel: None,
            target_language: default_target_language(),
            reminders: Vec::new(),
        }
    }
}

impl TenantSettings {
    pub fn is_source_channel(&self, channel_id: &str) -> bool {
        self.source_channels.iter().any(|c| c == channel_id)
    }
}

// ─────────────────────────────────────────────
// TenantStore
// ─────────────────────────────────────────────

/// Loads and saves tenant settings files.
///
/// Read-modify-write cycles go through [`TenantStore::update`], which holds a
/// per-tenant lock so concurrent writers cannot lose each other's changes.
pub struct TenantStore {
    dir: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TenantStore {
    /// Open (and create) the settings directory.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(TenantStore {
            dir,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, tenant_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(tenant_id)))
    }

    fn lock_for(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(tenant_id.to_string()).or_default().clone()
    }

    /// Load a tenant's settings; a tenant without a file gets the defaults.
    pub fn load(&self, tenant_id: &str) -> anyhow::Result<TenantSettings> {
        let path = self.path_for(tenant_id);
        if !path.exists() {
            return Ok(TenantSettings::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading tenant settings {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing tenant settings {}", path.display()))
    }

    /// Write a tenant's settings as a whole.
    pub fn save(&self, tenant_id: &str, settings: &TenantSettings) -> anyhow::Result<()> {
        let path = self.path_for(tenant_id);
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing tenant settings {}", path.display()))?;
        debug!(tenant = %tenant_id, "Tenant settings saved");
        Ok(())
    }

    /// Load, mutate, and save under the tenant's lock.
    pub async fn update<R>(
        &self,
        tenant_id: &str,
        f: impl FnOnce(&mut TenantSettings) -> R,
    ) -> anyhow::Result<R> {
        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;
        let mut settings = self.load(tenant_id)?;
        let result = f(&mut settings);
        self.save(tenant_id, &settings)?;
        Ok(result)
    }

    /// Ids of every tenant with a settings file.
    pub fn tenant_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
