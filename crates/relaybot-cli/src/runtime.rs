//! Service wiring shared by `gateway` and `chat`.
//!
//! Everything is built from one loaded [`Config`]: stores under the data
//! directory, the dialogue provider, the agent loop, the translator, the
//! reminder scheduler, and the command dispatcher. The console transport is
//! always registered so reminders and alerts have somewhere to go.

use std::sync::Arc;

use anyhow::{Context, Result};

use relaybot_agent::{AgentLoop, CommandDispatcher, DispatcherServices, Relay, RetrievalTool, Translator};
use relaybot_channels::{ChannelManager, ConsoleChannel, CONSOLE_TRANSPORT};
use relaybot_core::bus::{Delivery, MessageBus, OperatorContact};
use relaybot_core::config::Config;
use relaybot_core::log_forward::LogForwarder;
use relaybot_core::resilience::{Backoff, RateLimiter};
use relaybot_core::session::SessionStore;
use relaybot_core::store::{BlacklistStore, TenantStore, UsageTracker};
use relaybot_cron::{DailyReport, ReminderScheduler, SystemClock};
use relaybot_providers::{create_provider, LlmProvider};

/// Capacity of each bus direction.
const BUS_CAPACITY: usize = 100;

pub struct Runtime {
    pub config: Config,
    pub bus: Arc<MessageBus>,
    pub channels: ChannelManager,
    pub agent: Arc<AgentLoop>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub relay: Arc<Relay>,
    pub scheduler: ReminderScheduler,
    pub usage: Arc<UsageTracker>,
    pub operator: Option<OperatorContact>,
    pub logs: Arc<LogForwarder>,
}

impl Runtime {
    pub fn build(config: Config, logs: Arc<LogForwarder>) -> Result<Self> {
        let data_dir = config.storage.data_path();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;

        let bus = Arc::new(MessageBus::new(BUS_CAPACITY));
        let channels = ChannelManager::new(bus.clone());
        channels.register(Arc::new(ConsoleChannel::new(bus.clone(), config.console.clone())));
        let delivery: Arc<dyn Delivery> = channels.router();

        let operator = config.operator.is_configured().then(|| {
            OperatorContact::new(delivery.clone(), &config.operator.transport, &config.operator.id)
        });

        let provider = build_provider(&config)?;
        let backoff = Backoff::from_config(&config.resilience);
        let agent = Arc::new(build_agent_loop(&config, provider.clone(), backoff.clone())?);
        let translator = Arc::new(Translator::new(provider, &config.translation, backoff));

        let tenants = Arc::new(
            TenantStore::new(config.storage.tenants_dir()).context("failed to open tenant settings")?,
        );
        let blacklist = Arc::new(BlacklistStore::open(config.storage.blacklist_path())?);
        let usage = Arc::new(UsageTracker::open(config.storage.history_path())?);

        let mut limiter = RateLimiter::from_config(&config.resilience);
        if let Some(contact) = operator.clone() {
            limiter = limiter.with_operator(contact);
        }

        let scheduler = ReminderScheduler::new(
            tenants.clone(),
            delivery.clone(),
            CONSOLE_TRANSPORT,
            config.schedule.offset(),
            Arc::new(SystemClock),
        );

        let dispatcher = Arc::new(CommandDispatcher::new(DispatcherServices {
            agent: agent.clone(),
            translator: translator.clone(),
            scheduler: scheduler.clone(),
            tenants: tenants.clone(),
            blacklist: blacklist.clone(),
            usage: usage.clone(),
            limiter: Arc::new(limiter),
            delivery,
            logs: logs.clone(),
            operator_id: config.operator.is_configured().then(|| config.operator.id.clone()),
        }));
        let relay = Arc::new(Relay::new(tenants, blacklist, translator));

        Ok(Self {
            config,
            bus,
            channels,
            agent,
            dispatcher,
            relay,
            scheduler,
            usage,
            operator,
            logs,
        })
    }

    /// Flush forwarded logs through the registered transports until stopped.
    pub fn spawn_log_forwarding(&self) -> tokio::task::JoinHandle<()> {
        let logs = self.logs.clone();
        let delivery: Arc<dyn Delivery> = self.channels.router();
        tokio::spawn(async move { logs.run(delivery).await })
    }

    /// The daily usage report job for the configured schedule.
    pub fn daily_report(&self) -> Result<DailyReport> {
        DailyReport::new(
            self.usage.clone(),
            self.operator.clone(),
            &self.config.schedule.report_cron,
            self.config.schedule.offset(),
            Arc::new(SystemClock),
        )
    }
}

/// The dialogue provider for the configured model; fails without an API key.
pub fn build_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let provider = create_provider(&config.provider, &config.agent.model)?;
    Ok(Arc::new(provider))
}

/// An agent loop backed by the web retrieval tool.
pub fn build_agent_loop(config: &Config, provider: Arc<dyn LlmProvider>, backoff: Backoff) -> Result<AgentLoop> {
    let retrieval = RetrievalTool::new(config.search.clone())?;
    Ok(AgentLoop::new(
        provider,
        Arc::new(retrieval),
        Arc::new(SessionStore::new(config.agent.max_turns)),
        backoff,
        &config.agent,
        config.schedule.offset(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.to_string_lossy().into_owned();
        config.provider.api_key = "test-key".into();
        config
    }

    #[test]
    fn test_build_requires_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.provider.api_key.clear();
        assert!(Runtime::build(config, LogForwarder::new()).is_err());
    }

    #[tokio::test]
    async fn test_build_wires_console_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::build(config_in(dir.path()), LogForwarder::new()).unwrap();

        assert_eq!(runtime.channels.channel_names(), vec![CONSOLE_TRANSPORT]);
        assert!(dir.path().join("tenants").is_dir());
        assert!(runtime.operator.is_none());
        assert!(runtime.daily_report().is_ok());
    }

    #[tokio::test]
    async fn test_operator_contact_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.operator.id = "op".into();
        let runtime = Runtime::build(config, LogForwarder::new()).unwrap();
        assert_eq!(runtime.operator.as_ref().map(|o| o.operator_id()), Some("op"));
    }

    #[test]
    fn test_bad_report_schedule_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.schedule.report_cron = "whenever".into();
        let runtime = Runtime::build(config, LogForwarder::new()).unwrap();
        assert!(runtime.daily_report().is_err());
    }
}
