//! Reminder time expressions.
//!
//! Accepted forms: `10분`/`10m`/`10min`, `2시간`/`2h`, `1시간 30분`/`1h30m`,
//! and a clock time `HH:MM` (rolled to tomorrow if already past).

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::Regex;
use thiserror::Error;

/// Longest relative delay accepted: one year.
pub const MAX_DELAY_MINUTES: i64 = 365 * 24 * 60;

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(\d+)\s*(?:시간|h|hr|hrs|hours?))?\s*(?:(\d+)\s*(?:분|m|min|mins|minutes?))?$",
    )
    .expect("relative time regex must compile")
});

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})$").expect("clock time regex must compile")
});

/// The user typed something that is not a time expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhenError {
    #[error("⚠️ Invalid time format! Examples: `10m`, `1h 30m`, `23:50`")]
    BadFormat,
    #[error("⚠️ The delay has to be at least one minute.")]
    ZeroDelay,
    #[error("⚠️ That's too far away! Reminders can be set at most 365 days ahead.")]
    TooFar,
}

/// A parsed time expression, not yet anchored to a date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhenSpec {
    /// Fire after this many minutes.
    After { minutes: i64 },
    /// Fire at the next occurrence of this local clock time.
    At(NaiveTime),
}

impl FromStr for WhenSpec {
    type Err = WhenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err(WhenError::BadFormat);
        }

        if let Some(caps) = CLOCK_RE.captures(&s) {
            let hour: u32 = caps[1].parse().map_err(|_| WhenError::BadFormat)?;
            let minute: u32 = caps[2].parse().map_err(|_| WhenError::BadFormat)?;
            return NaiveTime::from_hms_opt(hour, minute, 0)
                .map(WhenSpec::At)
                .ok_or(WhenError::BadFormat);
        }

        let caps = RELATIVE_RE.captures(&s).ok_or(WhenError::BadFormat)?;
        let hours = caps.get(1).map(|m| m.as_str().parse::<i64>());
        let minutes = caps.get(2).map(|m| m.as_str().parse::<i64>());
        if hours.is_none() && minutes.is_none() {
            return Err(WhenError::BadFormat);
        }
        // Digits only, so a parse failure is an overflow.
        let hours = hours.transpose().map_err(|_| WhenError::TooFar)?.unwrap_or(0);
        let minutes = minutes.transpose().map_err(|_| WhenError::TooFar)?.unwrap_or(0);
        let total = hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or(WhenError::TooFar)?;
        if total == 0 {
            return Err(WhenError::ZeroDelay);
        }
        if total > MAX_DELAY_MINUTES {
            return Err(WhenError::TooFar);
        }
        Ok(WhenSpec::After { minutes: total })
    }
}

impl WhenSpec {
    /// Anchor the expression to local `now`.
    pub fn resolve(&self, now: NaiveDateTime) -> Result<NaiveDateTime, WhenError> {
        let (base, delta) = match *self {
            WhenSpec::After { minutes } => (now, TimeDelta::try_minutes(minutes)),
            WhenSpec::At(time) => {
                let today = now.date().and_time(time);
                if today > now {
                    return Ok(today);
                }
                (today, TimeDelta::try_days(1))
            }
        };
        delta
            .and_then(|d| base.checked_add_signed(d))
            .ok_or(WhenError::TooFar)
    }
}

/// Split a leading time expression off `input`.
///
/// Two-token expressions (`1시간 30분`, `1h 30m`) are tried before single
/// tokens. Returns the expression and the remaining text.
pub fn split_when(input: &str) -> Result<(WhenSpec, &str), WhenError> {
    let (first, rest) = split_token(input.trim());
    let (second, after_second) = split_token(rest);

    if !second.is_empty() {
        if let Ok(spec) = format!("{first} {second}").parse::<WhenSpec>() {
            return Ok((spec, after_second));
        }
    }
    let spec = first.parse::<WhenSpec>()?;
    Ok((spec, rest))
}

fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (s, ""),
    }
}

/// Move a daily fire time onto the first occurrence of its clock time that
/// is not before `now`.
pub fn roll_forward_daily(time: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    if time >= now {
        return time;
    }
    let mut next = now
        .date()
        .and_hms_opt(time.hour(), time.minute(), time.second())
        .unwrap_or(time);
    while next < now {
        next += Duration::days(1);
    }
    next
}
