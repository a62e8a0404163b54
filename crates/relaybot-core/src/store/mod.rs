//! File-backed stores: tenant settings, the blacklist, and usage history.

pub mod blacklist;
pub mod tenant;
pub mod usage;

pub use blacklist::{Blacklist, BlacklistStore, BlockOutcome, BlockTarget};
pub use tenant::{new_reminder_id, Recurrence, Reminder, TenantSettings, TenantStore};
pub use usage::{TenantHistory, UsageTracker};
