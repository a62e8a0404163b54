//! Relaybot scheduling: reminders, time expressions, and the daily usage report.

pub mod clock;
pub mod report;
pub mod service;
pub mod when;

pub use clock::{Clock, SystemClock, TokioClock};
pub use report::DailyReport;
pub use service::ReminderScheduler;
pub use when::{split_when, WhenError, WhenSpec};
