//! Command dispatcher.
//!
//! Every command passes the same gate before it runs: blacklist, usage
//! record, privilege check, setup check, then the rate limiter for the
//! expensive commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use relaybot_core::bus::{Delivery, InboundMessage, OutboundMessage};
use relaybot_core::log_forward::{LogForwarder, LogTarget};
use relaybot_core::resilience::RateLimiter;
use relaybot_core::store::{
    BlacklistStore, BlockOutcome, Recurrence, Reminder, TenantStore, UsageTracker,
};
use relaybot_core::utils::now_in;
use relaybot_cron::{ReminderScheduler, WhenSpec};

use crate::agent_loop::AgentLoop;
use crate::commands::{parse, Command, Privilege};
use crate::translate::{language_name, Translator, SUPPORTED_LANGUAGES};

const ADMIN_ONLY: &str = "❗ This command is for tenant administrators only.";
const OPERATOR_ONLY: &str = "❗ Only the bot operator can use this command!";
const TENANT_ONLY: &str = "This command can only be used inside a tenant!";
const SETUP_REQUIRED: &str = "Oops, the main channel isn't set yet! 😅\n\
     A tenant administrator has to pick one with `/set-main-channel` before the other commands can be used.";
const INTERNAL_ERROR: &str = "⚠ Something went wrong while handling that command. Please try again shortly!";

// ─────────────────────────────────────────────
// Context & reply
// ─────────────────────────────────────────────

/// Who issued a command and where.
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub actor_id: String,
    pub actor_name: String,
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub channel_id: String,
    /// Transport the command arrived on; replies and broadcasts go back through it.
    pub transport: String,
    pub is_admin: bool,
    pub received_at: DateTime<Utc>,
}

impl CommandContext {
    pub fn from_inbound(msg: &InboundMessage) -> Self {
        CommandContext {
            actor_id: msg.sender_id.clone(),
            actor_name: msg.author().to_string(),
            tenant_id: msg.tenant_id.clone(),
            tenant_name: msg.tenant_name.clone(),
            channel_id: msg.chat_id.clone(),
            transport: msg.channel.clone(),
            is_admin: msg.sender_is_admin(),
            received_at: msg.timestamp,
        }
    }

    fn location(&self) -> &str {
        self.tenant_name
            .as_deref()
            .or(self.tenant_id.as_deref())
            .unwrap_or("direct message")
    }
}

/// Text sent back to the issuer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Only the issuer should see this reply.
    pub private: bool,
}

impl Reply {
    pub fn public(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            private: false,
        }
    }

    pub fn private(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            private: true,
        }
    }
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

/// Everything the commands act on.
pub struct DispatcherServices {
    pub agent: Arc<AgentLoop>,
    pub translator: Arc<Translator>,
    pub scheduler: ReminderScheduler,
    pub tenants: Arc<TenantStore>,
    pub blacklist: Arc<BlacklistStore>,
    pub usage: Arc<UsageTracker>,
    pub limiter: Arc<RateLimiter>,
    pub delivery: Arc<dyn Delivery>,
    /// Forwards logs to the channel picked with `/set-log-channel`.
    pub logs: Arc<LogForwarder>,
    /// Actor id allowed to run operator commands.
    pub operator_id: Option<String>,
}

pub struct CommandDispatcher {
    services: DispatcherServices,
}

impl CommandDispatcher {
    pub fn new(services: DispatcherServices) -> Self {
        Self { services }
    }

    /// Parse and handle one line of slash-command text.
    ///
    /// Parse errors become a private corrective reply unless the issuer is blocked.
    pub async fn handle_line(&self, ctx: &CommandContext, line: &str) -> Option<Reply> {
        match parse(line) {
            Ok(command) => self.handle(ctx, command).await,
            Err(e) => {
                if self.is_blocked(ctx) {
                    return None;
                }
                debug!(actor = %ctx.actor_id, error = %e, "Malformed command");
                Some(Reply::private(e.to_string()))
            }
        }
    }

    /// Handle a parsed command. `None` means the command is silently ignored.
    pub async fn handle(&self, ctx: &CommandContext, command: Command) -> Option<Reply> {
        if self.is_blocked(ctx) {
            return None;
        }

        let name = command.name();
        info!(command = name, actor = %ctx.actor_id, location = %ctx.location(), "Command received");
        self.record_usage(ctx, name);

        match command.privilege() {
            Privilege::Admin if !ctx.is_admin => return Some(Reply::private(ADMIN_ONLY)),
            Privilege::Operator if !self.is_operator(&ctx.actor_id) => {
                return Some(Reply::private(OPERATOR_ONLY))
            }
            _ => {}
        }

        if command.needs_setup() {
            if let Some(tenant) = ctx.tenant_id.as_deref() {
                match self.services.tenants.load(tenant) {
                    Ok(settings) if settings.translation_channel.is_none() => {
                        return Some(Reply::public(SETUP_REQUIRED));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(tenant = %tenant, error = %e, "Failed to load tenant settings");
                        return Some(Reply::private(INTERNAL_ERROR));
                    }
                }
            }
        }

        if command.is_rate_limited() {
            let context = format!("/{name} in {}", ctx.location());
            if let Some(refusal) = self.services.limiter.guard(&ctx.actor_id, &context).await {
                return Some(Reply::private(refusal));
            }
        }

        match self.execute(ctx, command).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!(command = name, actor = %ctx.actor_id, error = %e, "Command failed");
                Some(Reply::private(INTERNAL_ERROR))
            }
        }
    }

    fn is_blocked(&self, ctx: &CommandContext) -> bool {
        self.services
            .blacklist
            .is_blocked(ctx.tenant_id.as_deref(), &ctx.channel_id)
    }

    fn is_operator(&self, actor_id: &str) -> bool {
        self.services.operator_id.as_deref() == Some(actor_id)
    }

    fn record_usage(&self, ctx: &CommandContext, name: &str) {
        let Some(tenant) = ctx.tenant_id.as_deref() else {
            return;
        };
        let tenant_name = ctx.tenant_name.as_deref().unwrap_or(tenant);
        let now = now_in(self.services.scheduler.offset());
        if let Err(e) = self.services.usage.record(tenant, tenant_name, name, now) {
            warn!(tenant = %tenant, error = %e, "Failed to record usage");
        }
    }

    async fn execute(&self, ctx: &CommandContext, command: Command) -> anyhow::Result<Reply> {
        let s = &self.services;
        let reply = match command {
            // ────────────── User commands ──────────────
            Command::Ask { question } => {
                let answer = s.agent.ask(&ctx.actor_id, &question).await;
                Reply::public(format!(
                    "✨ **Answer for {}**\n❓ ```{question}```\n\n{answer}",
                    ctx.actor_name
                ))
            }
            Command::Reset => {
                if s.agent.sessions().reset(&ctx.actor_id) {
                    Reply::private("Got it! Let's forget the earlier conversation and start fresh! ✨")
                } else {
                    Reply::private("Hmm... it looks like we hadn't talked yet!")
                }
            }
            Command::Remind {
                recurrence,
                when,
                message,
            } => self.remind(ctx, recurrence, when, message).await?,
            Command::Reminders => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let reminders = s.scheduler.list(tenant)?;
                if reminders.is_empty() {
                    Reply::private("📌 No reminders saved right now!")
                } else {
                    let lines: Vec<String> = reminders
                        .iter()
                        .enumerate()
                        .map(|(i, r)| {
                            format!(
                                "🔔 **{}.** `{}` | {} | 💬 {}",
                                i + 1,
                                r.display_time(),
                                r.recurrence,
                                r.message
                            )
                        })
                        .collect();
                    Reply::private(format!("📌 **Saved reminders**\n\n{}", lines.join("\n\n")))
                }
            }
            Command::CancelReminder { index } => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                match s.scheduler.cancel(tenant, index).await? {
                    Some(removed) => {
                        Reply::public(format!("✅ Okay! I'll forget the `{}` reminder.", removed.message))
                    }
                    None => Reply::private("⚠ There's no reminder with that number! Check `/reminders`."),
                }
            }
            Command::Translate { language, text } => {
                let Some(language_label) = language_name(&language) else {
                    return Ok(Reply::private(
                        "⚠ I don't know that language code yet! See `/languages`.",
                    ));
                };
                match s.translator.translate(&text, &language).await {
                    Ok(translated) => {
                        info!(actor = %ctx.actor_id, language = %language, "Manual translation done");
                        Reply::public(format!(
                            "📝 **Manual translation** (requested by {})\n\
                             **Original**\n```{text}```\n\
                             **Translation ({language_label})**\n```{translated}```",
                            ctx.actor_name
                        ))
                    }
                    Err(e) => {
                        error!(actor = %ctx.actor_id, error = %e, "Manual translation failed");
                        Reply::private("Hmm... the translation failed. Could you try again in a moment?")
                    }
                }
            }
            Command::Languages => {
                let lines: Vec<String> = SUPPORTED_LANGUAGES
                    .iter()
                    .map(|(code, name)| format!("- {name} (`{code}`)"))
                    .collect();
                Reply::public(format!("🌐 **Languages I can translate**\n{}", lines.join("\n")))
            }
            Command::Ping => {
                let latency = (Utc::now() - ctx.received_at).num_milliseconds().max(0);
                Reply::public(format!("🏓 Pong! Current response time is {latency}ms 🚀"))
            }
            Command::Check => Reply::public("Yes! I'm up and running perfectly! 💪"),
            Command::Help => Reply::public(help_text()),
            Command::TenantInfo => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                Reply::private(format!(
                    "📜 **Tenant info**\n🏢 Name: {}\n🔑 ID: `{tenant}`",
                    ctx.tenant_name.as_deref().unwrap_or(tenant)
                ))
            }

            // ────────────── Admin commands ──────────────
            Command::SetMainChannel { channel } => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let stored = channel.clone();
                s.tenants
                    .update(tenant, move |settings| settings.translation_channel = Some(stored))
                    .await?;
                Reply::public(format!("✅ Got it! Main messages will go to `{channel}` from now on! 💌"))
            }
            Command::AddSource { channel } => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let added = s
                    .tenants
                    .update(tenant, |settings| {
                        if settings.is_source_channel(&channel) {
                            false
                        } else {
                            settings.source_channels.push(channel.clone());
                            true
                        }
                    })
                    .await?;
                if added {
                    Reply::public(format!("✅ Messages in `{channel}` will now be translated too! ✨"))
                } else {
                    Reply::public(format!("`{channel}` is already being watched! 👀"))
                }
            }
            Command::RemoveSource { channel } => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let removed = s
                    .tenants
                    .update(tenant, |settings| {
                        let before = settings.source_channels.len();
                        settings.source_channels.retain(|c| c != &channel);
                        settings.source_channels.len() != before
                    })
                    .await?;
                if removed {
                    Reply::public(format!("✅ I'll stop translating `{channel}`."))
                } else {
                    Reply::public(format!("`{channel}` wasn't on the translation list!"))
                }
            }
            Command::SetLanguage { language } => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let Some(label) = language_name(&language) else {
                    return Ok(Reply::private(
                        "⚠ I don't know that language code yet! See `/languages`.",
                    ));
                };
                let code = language.clone();
                s.tenants
                    .update(tenant, move |settings| settings.target_language = code)
                    .await?;
                Reply::public(format!("✅ Auto-translation language changed to **{label}**!"))
            }
            Command::ShowSettings => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                let settings = s.tenants.load(tenant)?;
                let main = settings
                    .translation_channel
                    .as_deref()
                    .map_or_else(|| "not set yet".to_string(), |c| format!("`{c}`"));
                let sources = if settings.source_channels.is_empty() {
                    "none".to_string()
                } else {
                    settings
                        .source_channels
                        .iter()
                        .map(|c| format!("`{c}`"))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let language = language_name(&settings.target_language)
                    .unwrap_or(settings.target_language.as_str());
                Reply::public(format!(
                    "📜 **Current settings**\n\
                     📢 Main channel: {main}\n\
                     👀 Source channels: {sources}\n\
                     🌐 Target language: {language} (`{}`)\n\
                     ⏰ Reminders: {}",
                    settings.target_language,
                    settings.reminders.len()
                ))
            }
            Command::ResetChannels => {
                let Some(tenant) = ctx.tenant_id.as_deref() else {
                    return Ok(Reply::private(TENANT_ONLY));
                };
                s.tenants
                    .update(tenant, |settings| settings.source_channels.clear())
                    .await?;
                Reply::public("✅ Source channel settings have been cleared!")
            }
            Command::Broadcast { channel, message } => {
                let msg = OutboundMessage::new(&ctx.transport, &channel, message);
                match s.delivery.deliver(&msg).await {
                    Ok(()) => Reply::private(format!("✅ Announcement sent to `{channel}`!")),
                    Err(e) => {
                        error!(channel = %channel, error = %e, "Broadcast failed");
                        Reply::private("⚠ Couldn't send the announcement! Please check permissions.")
                    }
                }
            }

            // ────────────── Operator commands ──────────────
            Command::BroadcastAll { message } => self.broadcast_all(ctx, &message).await?,
            Command::Block { target, id } => match s.blacklist.block(target, &id)? {
                BlockOutcome::Blocked => Reply::private(format!("✅ Blocked {target} (ID: {id})")),
                BlockOutcome::AlreadyBlocked => {
                    Reply::private(format!("That ID is already in the blacklist! ({id})"))
                }
            },
            Command::Unblock { id } => match s.blacklist.unblock(&id)? {
                Some(target) => Reply::private(format!("✅ Unblocked {target} (ID: {id})")),
                None => Reply::private("⚠ That ID is not in the blacklist!"),
            },
            Command::ListTenants => {
                let tenants = s.usage.known_tenants();
                if tenants.is_empty() {
                    Reply::private("No tenants have used the bot yet!")
                } else {
                    let lines: Vec<String> = tenants
                        .iter()
                        .map(|(id, h)| format!("🏢 **{}**\n   - ID: `{id}`\n   - first seen: {}", h.name, h.first_seen))
                        .collect();
                    Reply::private(format!(
                        "🛰️ **{} known tenants**\n\n{}",
                        tenants.len(),
                        lines.join("\n\n")
                    ))
                }
            }
            Command::SetLogChannel { channel: Some(channel) } => {
                s.logs.set_target(Some(LogTarget {
                    transport: ctx.transport.clone(),
                    channel_id: channel.clone(),
                }));
                Reply::private(format!("✅ Got it! All logs will be sent to `#{channel}` from now on."))
            }
            Command::SetLogChannel { channel: None } => {
                s.logs.set_target(None);
                Reply::private("✅ Log forwarding stopped.")
            }
            Command::SpamTest { count, interval } => {
                let context = format!("/spam-test in {}", ctx.location());
                for sent in 1..=count {
                    if let Some(refusal) = s.limiter.guard(&ctx.actor_id, &context).await {
                        info!(actor = %ctx.actor_id, sent, "Spam test tripped the rate limiter");
                        return Ok(Reply::private(format!(
                            "{refusal}\n(tripped after {sent} simulated requests)"
                        )));
                    }
                    tokio::time::sleep(interval).await;
                }
                Reply::private("The test finished without detecting overload.")
            }
        };
        Ok(reply)
    }

    async fn remind(
        &self,
        ctx: &CommandContext,
        recurrence: Recurrence,
        when: WhenSpec,
        message: String,
    ) -> anyhow::Result<Reply> {
        let Some(tenant) = ctx.tenant_id.as_deref() else {
            return Ok(Reply::private(TENANT_ONLY));
        };
        let scheduler = &self.services.scheduler;
        let at = match when.resolve(scheduler.now_local()) {
            Ok(at) => at,
            Err(e) => return Ok(Reply::private(e.to_string())),
        };
        let reminder = Reminder::new(&ctx.actor_id, tenant, &ctx.channel_id, recurrence, at, message);
        let reminder = scheduler.add(reminder).await?;
        Ok(Reply::private(format!(
            "✅ I'll remember that!\n📅 `{}` ({})\n💬 `{}`",
            reminder.display_time(),
            reminder.recurrence,
            reminder.message
        )))
    }

    async fn broadcast_all(&self, ctx: &CommandContext, message: &str) -> anyhow::Result<Reply> {
        let s = &self.services;
        let text = format!("📢 **Announcement**\n\n{message}");
        let (mut sent, mut failed) = (0usize, 0usize);

        for tenant in s.tenants.tenant_ids()? {
            if s.blacklist.is_tenant_blocked(&tenant) {
                failed += 1;
                continue;
            }
            let destination = match s.tenants.load(&tenant) {
                Ok(settings) => settings.translation_channel,
                Err(e) => {
                    error!(tenant = %tenant, error = %e, "Failed to load tenant settings");
                    None
                }
            };
            let Some(channel) = destination else {
                failed += 1;
                continue;
            };
            match s
                .delivery
                .deliver(&OutboundMessage::new(&ctx.transport, &channel, &text))
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!(tenant = %tenant, error = %e, "Announcement delivery failed");
                    failed += 1;
                }
            }
        }

        info!(sent, failed, "Announcement broadcast finished");
        Ok(Reply::private(format!(
            "✅ Announcement sent! (delivered: {sent}, failed/skipped: {failed})"
        )))
    }
}

fn help_text() -> String {
    [
        "✨ **Command help** ✨",
        "💬 Chat & info: `/ask`, `/reset`, `/ping`, `/check`, `/server-info`",
        "🌐 Translation: `/translate`, `/languages`",
        "⏰ Reminders: `/remind [once|daily] <when> <message>`, `/reminders`, `/cancel-reminder <n>`",
        "👑 Admins: `/set-main-channel`, `/add-source`, `/remove-source`, `/set-language`, \
         `/show-settings`, `/reset-channels`, `/broadcast`",
    ]
    .join("\n")
}
