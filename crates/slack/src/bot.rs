use std::{sync::Arc, time::Duration};

use parley_core::{config::BotConfig, AppConfig, ApplicationError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    actions::{self, PlatformError, PostedMessage},
    commands::{extract_directed_command, mention_token, ParsedCommand},
    directory::{Directory, UserProfile},
    events::InboundEvent,
    handler::{CommandDispatcher, CommandHandler},
    session::{ConversationOutcome, ConversationRequest, ConversationSession},
    socket::ReconnectPolicy,
    time_limit::{TimeLimit, TimeoutSignal},
    transport::{SlackTransport, TransportError, TransportFactory},
};

pub const DEFAULT_BOT_NAME: &str = "Nameless bot";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    /// Used when the bot's own profile cannot be looked up.
    pub fallback_name: String,
    pub tick_interval: Duration,
    pub answer_wait_ticks: u32,
    pub reconnect_policy: ReconnectPolicy,
    pub directory_cache_ttl: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            fallback_name: DEFAULT_BOT_NAME.to_owned(),
            tick_interval: Duration::from_secs(1),
            answer_wait_ticks: crate::session::DEFAULT_MAX_WAIT_TICKS,
            reconnect_policy: ReconnectPolicy::default(),
            directory_cache_ttl: Duration::ZERO,
        }
    }
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fallback_name: config.bot.name.clone(),
            tick_interval: Duration::from_millis(config.bot.tick_interval_ms),
            answer_wait_ticks: config.bot.answer_wait_ticks,
            reconnect_policy: ReconnectPolicy::from_config(&config.socket),
            directory_cache_ttl: Duration::from_secs(config.directory.cache_ttl_secs),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollMode {
    NonStop,
    /// Stops cleanly at the first tick boundary past the deadline.
    Bounded(Duration),
}

impl PollMode {
    pub fn from_config(config: &BotConfig) -> Self {
        if config.non_stop {
            Self::NonStop
        } else {
            Self::Bounded(Duration::from_secs(config.poll_delta_secs))
        }
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("{bot_name} failed to start polling: {source}")]
    Connection { bot_name: String, source: TransportError },
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("command handler failed: {0:#}")]
    Handler(anyhow::Error),
    #[error("not enough data to start bot: {0}")]
    Configuration(String),
}

impl From<BotError> for ApplicationError {
    fn from(error: BotError) -> Self {
        match error {
            BotError::Connection { .. } => Self::Connection(error.to_string()),
            BotError::Platform(error) => error.into(),
            BotError::Handler(_) => Self::Handler(error.to_string()),
            BotError::Configuration(reason) => Self::Configuration(reason),
        }
    }
}

impl From<PlatformError> for ApplicationError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::NotOk { method, error } => Self::Platform { method, error },
            PlatformError::Decode { .. } => {
                Self::Platform { method: error.method().to_owned(), error: error.to_string() }
            }
            PlatformError::Transport(inner) => Self::Connection(inner.to_string()),
        }
    }
}

enum PollStop {
    Deadline(TimeoutSignal),
    Failed(BotError),
}

impl From<BotError> for PollStop {
    fn from(error: BotError) -> Self {
        Self::Failed(error)
    }
}

impl From<TimeoutSignal> for PollStop {
    fn from(signal: TimeoutSignal) -> Self {
        Self::Deadline(signal)
    }
}

pub struct BotBuilder {
    bot_id: String,
    factory: Arc<dyn TransportFactory>,
    handler: Option<Arc<dyn CommandHandler>>,
    settings: BotSettings,
}

impl BotBuilder {
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Opens the shared transport and resolves the bot's display name. The
    /// event stream itself is only connected once polling starts.
    pub async fn build(self) -> Result<Bot, BotError> {
        let bot_id = self.bot_id.trim().to_owned();
        if bot_id.is_empty() {
            return Err(BotError::Configuration("bot id is empty".to_owned()));
        }

        let transport = self.factory.open();
        let directory = Directory::new(transport.clone(), self.settings.directory_cache_ttl);
        let name = match directory.username_by_id(&bot_id).await {
            Some(name) => name,
            None => self.settings.fallback_name.clone(),
        };
        let dispatcher = match self.handler {
            Some(handler) => CommandDispatcher::new(handler),
            None => CommandDispatcher::default(),
        };

        info!(event_name = "bot.online", bot_name = %name, bot_id = %bot_id, "{name} bot is online");
        Ok(Bot {
            inner: Arc::new(BotInner {
                mention: mention_token(&bot_id),
                id: bot_id,
                name,
                transport,
                factory: self.factory,
                dispatcher,
                directory,
                settings: self.settings,
            }),
        })
    }
}

struct BotInner {
    id: String,
    name: String,
    mention: String,
    transport: Arc<dyn SlackTransport>,
    factory: Arc<dyn TransportFactory>,
    dispatcher: CommandDispatcher,
    directory: Directory,
    settings: BotSettings,
}

impl Drop for BotInner {
    fn drop(&mut self) {
        info!(event_name = "bot.destroyed", bot_name = %self.name, "{} destroyed", self.name);
    }
}

/// Handle to a running bot. Clones share the same connection, so a handler
/// can move a clone into a spawned task to converse without stalling polling.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    pub fn builder(bot_id: impl Into<String>, factory: Arc<dyn TransportFactory>) -> BotBuilder {
        BotBuilder { bot_id: bot_id.into(), factory, handler: None, settings: BotSettings::default() }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mention(&self) -> &str {
        &self.inner.mention
    }

    pub fn settings(&self) -> &BotSettings {
        &self.inner.settings
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    pub async fn bot_info(&self) -> Result<Option<UserProfile>, PlatformError> {
        self.inner.directory.user_by_id(&self.inner.id).await
    }

    /// Raw Web API call. The reply is returned as-is, `ok: false` included.
    pub async fn custom_api_call(&self, method: &str, params: Value) -> Result<Value, PlatformError> {
        Ok(self.inner.transport.call(method, params).await?)
    }

    pub async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        debug!(bot_name = %self.inner.name, channel, text = %text, "sending message");
        self.inner.transport.send(channel, text).await
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage, PlatformError> {
        debug!(bot_name = %self.inner.name, channel, text = %text, "posting message");
        actions::post_message(self.inner.transport.as_ref(), channel, text).await
    }

    pub async fn add_reaction(
        &self,
        message: &PostedMessage,
        emoji: &str,
        channel: &str,
    ) -> Result<(), PlatformError> {
        actions::add_reaction(self.inner.transport.as_ref(), message, emoji, channel).await
    }

    /// Finds the first command addressed to this bot and resolves the sender's
    /// name.
    pub async fn parse_directed_command(&self, events: &[InboundEvent]) -> Option<ParsedCommand> {
        let mut command = extract_directed_command(events, &self.inner.mention)?;
        if let Some(user_id) = command.user_id.as_deref() {
            command.user_name = self.inner.directory.username_by_id(user_id).await;
        }
        Some(command)
    }

    /// Starts a request with this bot's configured wait budget.
    pub fn conversation<I, S>(
        &self,
        question: impl Into<String>,
        allowed_answers: I,
        channel: impl Into<String>,
        user: impl Into<String>,
    ) -> ConversationRequest
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ConversationRequest::new(question, allowed_answers, channel, user)
            .max_wait_ticks(self.inner.settings.answer_wait_ticks)
    }

    pub async fn converse(&self, request: &ConversationRequest) -> ConversationOutcome {
        let tick = self.inner.settings.tick_interval;
        let session = if request.dedicated_connection {
            ConversationSession::dedicated(self.inner.factory.as_ref(), tick)
        } else {
            ConversationSession::shared(self.inner.transport.clone(), tick)
        };

        info!(
            bot_name = %self.inner.name,
            conversation_id = %session.conversation_id(),
            user = %request.user,
            question = %request.question,
            "asking user"
        );
        let outcome = session.run(request).await;
        if let ConversationOutcome::Answered(answer) = &outcome {
            info!(conversation_id = %session.conversation_id(), user = %request.user, answer = %answer, "user answered");
        }
        outcome
    }

    /// Blocks the calling task until the user answers. Spawn it onto its own
    /// task with a dedicated connection to keep the poll loop responsive.
    pub async fn wait_for_answer_from_user(&self, request: &ConversationRequest) -> Option<String> {
        self.converse(request).await.into_answer()
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.transport.disconnect().await
    }

    /// Reads, dispatches and sleeps one tick at a time. Handler failures stop
    /// the loop and are returned; a bounded loop returns `Ok` at its deadline.
    pub async fn poll(&self, mode: PollMode) -> Result<(), BotError> {
        let name = &self.inner.name;
        if let Err(source) = self.inner.transport.connect().await {
            error!(
                event_name = "bot.connect_failed",
                bot_name = %name,
                error = %source,
                "Connection failed. Invalid Slack token or bot ID?"
            );
            return Err(BotError::Connection { bot_name: name.clone(), source });
        }
        info!(event_name = "bot.polling_started", bot_name = %name, mode = ?mode, "{name} started polling");

        let limit = match mode {
            PollMode::NonStop => None,
            PollMode::Bounded(delta) => Some(TimeLimit::new(delta)),
        };

        match self.run_cycles(limit.as_ref()).await {
            Ok(()) => Ok(()),
            Err(PollStop::Deadline(signal)) => {
                info!(
                    event_name = "bot.polling_stopped",
                    bot_name = %name,
                    limit_secs = signal.limit.as_secs_f64(),
                    "{name} stopped polling"
                );
                Ok(())
            }
            Err(PollStop::Failed(error)) => {
                error!(event_name = "bot.polling_failed", bot_name = %name, error = %error, "polling aborted");
                Err(error)
            }
        }
    }

    async fn run_cycles(&self, limit: Option<&TimeLimit>) -> Result<(), PollStop> {
        let mut failed_reads = 0_u32;

        loop {
            match self.inner.transport.read_batch().await {
                Ok(batch) => {
                    failed_reads = 0;
                    if let Some(command) = self.parse_directed_command(&batch).await {
                        if !command.text.is_empty() {
                            self.inner
                                .dispatcher
                                .dispatch(self, &command)
                                .await
                                .map_err(BotError::Handler)?;
                        }
                    }
                }
                Err(error) => self.reconnect(&mut failed_reads, error, limit).await?,
            }

            pause(limit, self.inner.settings.tick_interval).await?;
        }
    }

    async fn reconnect(
        &self,
        attempt: &mut u32,
        mut last_error: TransportError,
        limit: Option<&TimeLimit>,
    ) -> Result<(), PollStop> {
        let policy = &self.inner.settings.reconnect_policy;

        loop {
            if *attempt >= policy.max_retries {
                return Err(BotError::Connection {
                    bot_name: self.inner.name.clone(),
                    source: last_error,
                }
                .into());
            }

            let delay = policy.backoff(*attempt);
            *attempt += 1;
            warn!(
                event_name = "bot.reconnecting",
                bot_name = %self.inner.name,
                attempt = *attempt,
                max_retries = policy.max_retries,
                error = %last_error,
                "event stream lost; reconnecting"
            );
            pause(limit, delay).await?;

            match self.inner.transport.connect().await {
                Ok(()) => return Ok(()),
                Err(error) => last_error = error,
            }
        }
    }
}

async fn pause(limit: Option<&TimeLimit>, duration: Duration) -> Result<(), TimeoutSignal> {
    match limit {
        Some(limit) => limit.sleep(duration).await,
        None if duration.is_zero() => {
            tokio::task::yield_now().await;
            Ok(())
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::{AppConfig, ApplicationError};

    use super::{BotError, BotSettings, PollMode};
    use crate::{actions::PlatformError, transport::TransportError};

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.bot.name = "coffee".to_owned();
        config.bot.tick_interval_ms = 250;
        config.directory.cache_ttl_secs = 30;

        let settings = BotSettings::from_config(&config);
        assert_eq!(settings.fallback_name, "coffee");
        assert_eq!(settings.tick_interval, Duration::from_millis(250));
        assert_eq!(settings.answer_wait_ticks, 120);
        assert_eq!(settings.directory_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn poll_mode_follows_non_stop_flag() {
        let mut config = AppConfig::default();
        assert_eq!(PollMode::from_config(&config.bot), PollMode::NonStop);

        config.bot.non_stop = false;
        config.bot.poll_delta_secs = 90;
        assert_eq!(PollMode::from_config(&config.bot), PollMode::Bounded(Duration::from_secs(90)));
    }

    #[test]
    fn bot_errors_map_to_application_errors() {
        let connection = BotError::Connection {
            bot_name: "coffee".to_owned(),
            source: TransportError::Connect("invalid_auth".to_owned()),
        };
        let mapped = ApplicationError::from(connection);
        assert_eq!(mapped.error_class(), "connection");
        assert!(mapped.to_string().contains("coffee failed to start polling"));

        let platform = BotError::Platform(PlatformError::NotOk {
            method: "reactions.add".to_owned(),
            error: "already_reacted".to_owned(),
        });
        assert_eq!(
            ApplicationError::from(platform),
            ApplicationError::Platform {
                method: "reactions.add".to_owned(),
                error: "already_reacted".to_owned()
            }
        );

        let handler = BotError::Handler(anyhow::anyhow!("boom").context("coffee handler"));
        let mapped = ApplicationError::from(handler);
        assert_eq!(mapped.exit_code(), 5);
        assert!(mapped.to_string().contains("coffee handler: boom"));
    }
}
