//! Slash-command grammar.
//!
//! `/name arg...` text is parsed into a typed [`Command`]; malformed input
//! becomes a [`CommandParseError`] whose message is shown to the user.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use relaybot_core::store::{BlockTarget, Recurrence};
use relaybot_cron::{split_when, WhenError, WhenSpec};

/// Requests sent by the spam test when no count is given.
pub const DEFAULT_SPAM_COUNT: usize = 15;
/// Pause between spam-test requests when no interval is given.
pub const DEFAULT_SPAM_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    // User commands
    Ask { question: String },
    Reset,
    Remind { recurrence: Recurrence, when: WhenSpec, message: String },
    Reminders,
    CancelReminder { index: usize },
    Translate { language: String, text: String },
    Languages,
    Ping,
    Check,
    Help,
    TenantInfo,

    // Tenant administrator commands
    SetMainChannel { channel: String },
    AddSource { channel: String },
    RemoveSource { channel: String },
    SetLanguage { language: String },
    ShowSettings,
    ResetChannels,
    Broadcast { channel: String, message: String },

    // Operator commands
    BroadcastAll { message: String },
    Block { target: BlockTarget, id: String },
    Unblock { id: String },
    ListTenants,
    SpamTest { count: usize, interval: Duration },
    /// `None` stops log forwarding.
    SetLogChannel { channel: Option<String> },
}

/// Who may run a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    Anyone,
    Admin,
    Operator,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Commands start with `/`.")]
    NotACommand,
    #[error("⚠ I don't know `/{0}`. Try `/help`!")]
    Unknown(String),
    #[error("⚠ Usage: `{0}`")]
    Usage(&'static str),
    #[error("⚠ `{0}` is not a valid number.")]
    NotANumber(String),
    #[error("⚠ ID must be numeric!")]
    NonNumericId,
    #[error("⚠ {0}")]
    BadTarget(String),
    #[error(transparent)]
    BadTime(#[from] WhenError),
}

impl Command {
    /// Canonical command name, used for usage counting and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ask { .. } => "ask",
            Command::Reset => "reset",
            Command::Remind { .. } => "remind",
            Command::Reminders => "reminders",
            Command::CancelReminder { .. } => "cancel-reminder",
            Command::Translate { .. } => "translate",
            Command::Languages => "languages",
            Command::Ping => "ping",
            Command::Check => "check",
            Command::Help => "help",
            Command::TenantInfo => "server-info",
            Command::SetMainChannel { .. } => "set-main-channel",
            Command::AddSource { .. } => "add-source",
            Command::RemoveSource { .. } => "remove-source",
            Command::SetLanguage { .. } => "set-language",
            Command::ShowSettings => "show-settings",
            Command::ResetChannels => "reset-channels",
            Command::Broadcast { .. } => "broadcast",
            Command::BroadcastAll { .. } => "broadcast-all",
            Command::Block { .. } => "block",
            Command::Unblock { .. } => "unblock",
            Command::ListTenants => "list-tenants",
            Command::SpamTest { .. } => "spam-test",
            Command::SetLogChannel { .. } => "set-log-channel",
        }
    }

    pub fn privilege(&self) -> Privilege {
        match self {
            Command::SetMainChannel { .. }
            | Command::AddSource { .. }
            | Command::RemoveSource { .. }
            | Command::SetLanguage { .. }
            | Command::ShowSettings
            | Command::ResetChannels
            | Command::Broadcast { .. } => Privilege::Admin,
            Command::BroadcastAll { .. }
            | Command::Block { .. }
            | Command::Unblock { .. }
            | Command::ListTenants
            | Command::SpamTest { .. }
            | Command::SetLogChannel { .. } => Privilege::Operator,
            _ => Privilege::Anyone,
        }
    }

    /// Whether the tenant must have a main channel before this runs.
    pub fn needs_setup(&self) -> bool {
        matches!(
            self,
            Command::Ask { .. }
                | Command::Reset
                | Command::Check
                | Command::Remind { .. }
                | Command::Reminders
                | Command::CancelReminder { .. }
                | Command::Translate { .. }
                | Command::AddSource { .. }
                | Command::RemoveSource { .. }
                | Command::SetLanguage { .. }
        )
    }

    /// Whether the per-actor rate limiter applies.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Command::Ask { .. } | Command::Check | Command::Remind { .. } | Command::SpamTest { .. }
        )
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse(line)
    }
}

/// Parse one line of slash-command text.
pub fn parse(line: &str) -> Result<Command, CommandParseError> {
    let line = line.trim();
    let body = line.strip_prefix('/').ok_or(CommandParseError::NotACommand)?;
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "ask" => Command::Ask {
            question: required(rest, "/ask <question>")?.to_string(),
        },
        "reset" | "new" => Command::Reset,
        "remind" => parse_remind(rest)?,
        "reminders" => Command::Reminders,
        "cancel-reminder" => Command::CancelReminder {
            index: number(required(rest, "/cancel-reminder <number>")?)?,
        },
        "translate" => {
            let (language, text) = split_first(rest);
            if language.is_empty() || text.is_empty() {
                return Err(CommandParseError::Usage("/translate <language-code> <text>"));
            }
            Command::Translate {
                language: language.to_lowercase(),
                text: text.to_string(),
            }
        }
        "languages" => Command::Languages,
        "ping" => Command::Ping,
        "check" => Command::Check,
        "help" => Command::Help,
        "server-info" | "tenant-info" => Command::TenantInfo,

        "set-main-channel" => Command::SetMainChannel {
            channel: channel_ref(required(rest, "/set-main-channel <channel>")?),
        },
        "add-source" => Command::AddSource {
            channel: channel_ref(required(rest, "/add-source <channel>")?),
        },
        "remove-source" => Command::RemoveSource {
            channel: channel_ref(required(rest, "/remove-source <channel>")?),
        },
        "set-language" => Command::SetLanguage {
            language: required(rest, "/set-language <language-code>")?.to_lowercase(),
        },
        "show-settings" => Command::ShowSettings,
        "reset-channels" => Command::ResetChannels,
        "broadcast" => {
            let (channel, message) = split_first(rest);
            if channel.is_empty() || message.is_empty() {
                return Err(CommandParseError::Usage("/broadcast <channel> <message>"));
            }
            Command::Broadcast {
                channel: channel_ref(channel),
                message: message.to_string(),
            }
        }

        "broadcast-all" => Command::BroadcastAll {
            message: required(rest, "/broadcast-all <message>")?.to_string(),
        },
        "block" => {
            let (target, id) = split_first(rest);
            if target.is_empty() || id.is_empty() {
                return Err(CommandParseError::Usage("/block tenant|channel <id>"));
            }
            let target = target.parse::<BlockTarget>().map_err(CommandParseError::BadTarget)?;
            Command::Block {
                target,
                id: numeric_id(id)?,
            }
        }
        "unblock" => Command::Unblock {
            id: numeric_id(required(rest, "/unblock <id>")?)?,
        },
        "list-tenants" => Command::ListTenants,
        "spam-test" => {
            let mut args = rest.split_whitespace();
            let count = args.next().map(number).transpose()?.unwrap_or(DEFAULT_SPAM_COUNT);
            let interval = args
                .next()
                .map(|ms| number(ms).map(|ms| Duration::from_millis(ms as u64)))
                .transpose()?
                .unwrap_or(DEFAULT_SPAM_INTERVAL);
            Command::SpamTest { count, interval }
        }
        "set-log-channel" => Command::SetLogChannel {
            channel: (!rest.is_empty()).then(|| channel_ref(rest)),
        },

        other => return Err(CommandParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

/// `/remind [once|daily] <when> <message>`
fn parse_remind(rest: &str) -> Result<Command, CommandParseError> {
    const USAGE: &str = "/remind [once|daily] <when> <message>";

    let (first, after_first) = split_first(rest);
    let (recurrence, rest) = match first.to_lowercase().as_str() {
        "daily" => (Recurrence::Daily, after_first),
        "once" => (Recurrence::Once, after_first),
        _ => (Recurrence::Once, rest),
    };
    if rest.is_empty() {
        return Err(CommandParseError::Usage(USAGE));
    }

    let (when, message) = split_when(rest)?;
    if message.trim().is_empty() {
        return Err(CommandParseError::Usage(USAGE));
    }
    Ok(Command::Remind {
        recurrence,
        when,
        message: message.trim().to_string(),
    })
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, CommandParseError> {
    if rest.is_empty() {
        Err(CommandParseError::Usage(usage))
    } else {
        Ok(rest)
    }
}

fn split_first(s: &str) -> (&str, &str) {
    match s.trim().split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (s.trim(), ""),
    }
}

fn number(s: &str) -> Result<usize, CommandParseError> {
    s.trim()
        .parse()
        .map_err(|_| CommandParseError::NotANumber(s.trim().to_string()))
}

fn numeric_id(s: &str) -> Result<String, CommandParseError> {
    let s = s.trim();
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        Ok(s.to_string())
    } else {
        Err(CommandParseError::NonNumericId)
    }
}

/// Accept `#name`, `<#id>`, or a bare channel id.
fn channel_ref(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix("<#")
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or_else(|| s.trim_start_matches('#'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("/ping").unwrap(), Command::Ping);
        assert_eq!(parse("  /HELP ").unwrap(), Command::Help);
        assert_eq!(parse("/new").unwrap(), Command::Reset);
        assert_eq!("/reminders".parse::<Command>().unwrap(), Command::Reminders);
    }

    #[test]
    fn test_parse_ask_keeps_full_question() {
        assert_eq!(
            parse("/ask what is  the weather?").unwrap(),
            Command::Ask {
                question: "what is  the weather?".into()
            }
        );
        assert_eq!(parse("/ask").unwrap_err(), CommandParseError::Usage("/ask <question>"));
    }

    #[test]
    fn test_parse_remind() {
        assert_eq!(
            parse("/remind 10m stretch").unwrap(),
            Command::Remind {
                recurrence: Recurrence::Once,
                when: WhenSpec::After { minutes: 10 },
                message: "stretch".into()
            }
        );
        assert_eq!(
            parse("/remind daily 23:50 stand-up notes").unwrap(),
            Command::Remind {
                recurrence: Recurrence::Daily,
                when: WhenSpec::At(NaiveTime::from_hms_opt(23, 50, 0).unwrap()),
                message: "stand-up notes".into()
            }
        );
        assert_eq!(
            parse("/remind 1h 30m tea").unwrap(),
            Command::Remind {
                recurrence: Recurrence::Once,
                when: WhenSpec::After { minutes: 90 },
                message: "tea".into()
            }
        );
    }

    #[test]
    fn test_parse_remind_errors() {
        assert_eq!(
            parse("/remind soon stretch").unwrap_err(),
            CommandParseError::BadTime(WhenError::BadFormat)
        );
        assert!(matches!(parse("/remind 10m").unwrap_err(), CommandParseError::Usage(_)));
        assert!(matches!(parse("/remind daily").unwrap_err(), CommandParseError::Usage(_)));
    }

    #[test]
    fn test_parse_block_requires_numeric_id() {
        assert_eq!(
            parse("/block tenant 12345").unwrap(),
            Command::Block {
                target: BlockTarget::Tenant,
                id: "12345".into()
            }
        );
        assert_eq!(parse("/block channel abc").unwrap_err(), CommandParseError::NonNumericId);
        assert_eq!(parse("/unblock 12x").unwrap_err(), CommandParseError::NonNumericId);
        assert!(matches!(parse("/block planet 1").unwrap_err(), CommandParseError::BadTarget(_)));
    }

    #[test]
    fn test_parse_spam_test_defaults() {
        assert_eq!(
            parse("/spam-test").unwrap(),
            Command::SpamTest {
                count: DEFAULT_SPAM_COUNT,
                interval: DEFAULT_SPAM_INTERVAL
            }
        );
        assert_eq!(
            parse("/spam-test 5 250").unwrap(),
            Command::SpamTest {
                count: 5,
                interval: Duration::from_millis(250)
            }
        );
        assert_eq!(
            parse("/spam-test lots").unwrap_err(),
            CommandParseError::NotANumber("lots".into())
        );
    }

    #[test]
    fn test_parse_channel_refs_and_translate() {
        assert_eq!(
            parse("/add-source #general").unwrap(),
            Command::AddSource {
                channel: "general".into()
            }
        );
        assert_eq!(
            parse("/set-main-channel <#42>").unwrap(),
            Command::SetMainChannel { channel: "42".into() }
        );
        assert_eq!(
            parse("/translate JA good morning").unwrap(),
            Command::Translate {
                language: "ja".into(),
                text: "good morning".into()
            }
        );
        assert!(matches!(parse("/translate ja").unwrap_err(), CommandParseError::Usage(_)));
    }

    #[test]
    fn test_parse_set_log_channel() {
        assert_eq!(
            parse("/set-log-channel #ops-log").unwrap(),
            Command::SetLogChannel {
                channel: Some("ops-log".into())
            }
        );
        assert_eq!(parse("/set-log-channel").unwrap(), Command::SetLogChannel { channel: None });
        let cmd = parse("/set-log-channel <#42>").unwrap();
        assert_eq!(cmd.privilege(), Privilege::Operator);
        assert!(!cmd.needs_setup());
        assert!(!cmd.is_rate_limited());
    }

    #[test]
    fn test_unknown_and_not_a_command() {
        assert_eq!(parse("/dance").unwrap_err(), CommandParseError::Unknown("dance".into()));
        assert_eq!(parse("hello").unwrap_err(), CommandParseError::NotACommand);
    }

    #[test]
    fn test_command_metadata() {
        let ask = Command::Ask { question: "q".into() };
        assert_eq!(ask.name(), "ask");
        assert_eq!(ask.privilege(), Privilege::Anyone);
        assert!(ask.needs_setup());
        assert!(ask.is_rate_limited());

        assert_eq!(Command::ShowSettings.privilege(), Privilege::Admin);
        assert!(!Command::ShowSettings.needs_setup());
        assert_eq!(Command::ListTenants.privilege(), Privilege::Operator);
        assert!(!Command::Ping.is_rate_limited());
        assert!(!Command::Languages.needs_setup());
    }
}
