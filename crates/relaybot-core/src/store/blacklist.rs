//! Blocked tenants and channels, persisted as one JSON file.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

/// On-disk blacklist record.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Blacklist {
    #[serde(default)]
    pub blocked_tenants: Vec<String>,
    #[serde(default)]
    pub blocked_channels: Vec<String>,
}

/// Which list an id belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTarget {
    Tenant,
    Channel,
}

impl std::str::FromStr for BlockTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tenant" | "server" | "guild" => Ok(BlockTarget::Tenant),
            "channel" => Ok(BlockTarget::Channel),
            other => Err(format!("unknown block target '{other}' (use tenant or channel)")),
        }
    }
}

impl std::fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTarget::Tenant => write!(f, "tenant"),
            BlockTarget::Channel => write!(f, "channel"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    Blocked,
    AlreadyBlocked,
}

/// In-memory blacklist mirrored to disk on every change.
pub struct BlacklistStore {
    path: PathBuf,
    state: RwLock<Blacklist>,
}

impl BlacklistStore {
    /// Load the blacklist, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading blacklist {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing blacklist {}", path.display()))?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let empty = Blacklist::default();
            std::fs::write(&path, serde_json::to_string_pretty(&empty)?)?;
            info!("Created empty blacklist at {}", path.display());
            empty
        };
        Ok(BlacklistStore {
            path,
            state: RwLock::new(state),
        })
    }

    /// Whether either the tenant or the channel is blocked.
    pub fn is_blocked(&self, tenant_id: Option<&str>, channel_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        tenant_id.is_some_and(|t| state.blocked_tenants.iter().any(|b| b == t))
            || state.blocked_channels.iter().any(|b| b == channel_id)
    }

    pub fn is_tenant_blocked(&self, tenant_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.blocked_tenants.iter().any(|b| b == tenant_id)
    }

    pub fn snapshot(&self) -> Blacklist {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add an id to one list. An id already on either list is left alone.
    pub fn block(&self, target: BlockTarget, id: &str) -> anyhow::Result<BlockOutcome> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let listed = state
            .blocked_tenants
            .iter()
            .chain(&state.blocked_channels)
            .any(|b| b == id);
        if listed {
            return Ok(BlockOutcome::AlreadyBlocked);
        }
        match target {
            BlockTarget::Tenant => state.blocked_tenants.push(id.to_string()),
            BlockTarget::Channel => state.blocked_channels.push(id.to_string()),
        }
        self.persist(&state)?;
        info!(%target, id, "Blocked");
        Ok(BlockOutcome::Blocked)
    }

    /// Remove an id from whichever list holds it (tenants first).
    pub fn unblock(&self, id: &str) -> anyhow::Result<Option<BlockTarget>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let target = if let Some(pos) = state.blocked_tenants.iter().position(|b| b == id) {
            state.blocked_tenants.remove(pos);
            BlockTarget::Tenant
        } else if let Some(pos) = state.blocked_channels.iter().position(|b| b == id) {
            state.blocked_channels.remove(pos);
            BlockTarget::Channel
        } else {
            return Ok(None);
        };
        self.persist(&state)?;
        info!(%target, id, "Unblocked");
        Ok(Some(target))
    }

    fn persist(&self, state: &Blacklist) -> anyhow::Result<()> {
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("writing blacklist {}", self.path.display()))
    }
}
