//! Wait-for-answer conversations.
//!
//! A session prompts one user in one channel, then polls its transport tick by
//! tick until that user answers with an allowed value, types `cancel`, or the
//! tick budget runs out. Invalid answers get a retry prompt without extending
//! the budget, and long waits get periodic reminders.
//!
//! A session reading from the shared transport races the poll loop for events:
//! each `read_batch` drains a disjoint slice. Run concurrent conversations on a
//! dedicated connection instead.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    commands::{extract_answer, mention_token, normalize_command},
    transport::{SlackTransport, TransportFactory},
};

pub const CANCEL_KEYWORD: &str = "cancel";
pub const DEFAULT_MAX_WAIT_TICKS: u32 = 120;

const NUDGE_EVERY_TICKS: u32 = 30;
const NUDGE_FROM_TICK: u32 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationRequest {
    pub question: String,
    /// Lowercased, deduplicated, in the order given.
    pub allowed_answers: Vec<String>,
    pub channel: String,
    pub user: String,
    pub max_wait_ticks: u32,
    pub dedicated_connection: bool,
}

impl ConversationRequest {
    pub fn new<I, S>(
        question: impl Into<String>,
        allowed_answers: I,
        channel: impl Into<String>,
        user: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut answers: Vec<String> = Vec::new();
        for answer in allowed_answers {
            let answer = normalize_command(answer.as_ref());
            if !answer.is_empty() && !answers.contains(&answer) {
                answers.push(answer);
            }
        }

        Self {
            question: question.into(),
            allowed_answers: answers,
            channel: channel.into(),
            user: user.into(),
            max_wait_ticks: DEFAULT_MAX_WAIT_TICKS,
            dedicated_connection: false,
        }
    }

    pub fn max_wait_ticks(mut self, ticks: u32) -> Self {
        self.max_wait_ticks = ticks;
        self
    }

    pub fn dedicated_connection(mut self, dedicated: bool) -> Self {
        self.dedicated_connection = dedicated;
        self
    }

    pub fn accepts(&self, answer: &str) -> bool {
        let answer = normalize_command(answer);
        self.allowed_answers.iter().any(|allowed| *allowed == answer)
    }

    pub fn rendered_answers(&self) -> String {
        format!("[{}]", self.allowed_answers.join(", "))
    }

    fn prompt(&self) -> String {
        format!(
            "{}\nAvailable answers are: `{}`\nOr just type {CANCEL_KEYWORD} to cancel :facepalm:",
            self.question,
            self.rendered_answers()
        )
    }

    fn retry_prompt(&self) -> String {
        format!("Answer should be one of the: `{}`", self.rendered_answers())
    }

    fn nudge(&self) -> String {
        format!("Hey {} I'm still waiting for the answer :neutral_face:", mention_token(&self.user))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationOutcome {
    Answered(String),
    Cancelled,
    Expired,
    ConnectionFailed,
}

impl ConversationOutcome {
    pub fn into_answer(self) -> Option<String> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::Cancelled | Self::Expired | Self::ConnectionFailed => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Answered(_) => "answered",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::ConnectionFailed => "connection_failed",
        }
    }
}

pub struct ConversationSession {
    transport: Arc<dyn SlackTransport>,
    owns_connection: bool,
    tick_interval: Duration,
    conversation_id: Uuid,
}

impl ConversationSession {
    /// Reads from a transport someone else owns; the connection stays open.
    pub fn shared(transport: Arc<dyn SlackTransport>, tick_interval: Duration) -> Self {
        Self { transport, owns_connection: false, tick_interval, conversation_id: Uuid::new_v4() }
    }

    /// Opens a fresh connection that is closed again when the session ends.
    pub fn dedicated(factory: &dyn TransportFactory, tick_interval: Duration) -> Self {
        Self {
            transport: factory.open(),
            owns_connection: true,
            tick_interval,
            conversation_id: Uuid::new_v4(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub async fn run(&self, request: &ConversationRequest) -> ConversationOutcome {
        info!(
            event_name = "conversation.started",
            conversation_id = %self.conversation_id,
            channel = %request.channel,
            user = %request.user,
            max_wait_ticks = request.max_wait_ticks,
            dedicated = self.owns_connection,
            "waiting for answer"
        );

        let outcome = self.converse(request).await;

        if self.owns_connection {
            if let Err(error) = self.transport.disconnect().await {
                warn!(conversation_id = %self.conversation_id, error = %error, "failed to close conversation connection");
            }
        }
        info!(
            event_name = "conversation.finished",
            conversation_id = %self.conversation_id,
            outcome = outcome.label(),
            "conversation finished"
        );
        outcome
    }

    async fn converse(&self, request: &ConversationRequest) -> ConversationOutcome {
        if let Err(error) = self.transport.connect().await {
            warn!(
                event_name = "conversation.connect_failed",
                conversation_id = %self.conversation_id,
                error = %error,
                "Connection failed. Invalid Slack token or bot ID?"
            );
            return ConversationOutcome::ConnectionFailed;
        }

        self.say(&request.channel, &request.prompt()).await;

        for tick in 0..request.max_wait_ticks {
            if let Some(answer) = self.read_answer(request).await {
                if answer == CANCEL_KEYWORD {
                    return ConversationOutcome::Cancelled;
                }
                if request.accepts(&answer) {
                    return ConversationOutcome::Answered(answer);
                }
                self.say(&request.channel, &request.retry_prompt()).await;
            }

            if tick > 0 && tick % NUDGE_EVERY_TICKS == 0 && tick >= NUDGE_FROM_TICK {
                self.say(&request.channel, &request.nudge()).await;
            }

            if self.tick_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.tick_interval).await;
            }
        }

        ConversationOutcome::Expired
    }

    /// Normalized answer from the expected user and channel, if this tick's
    /// batch carries one. A failed read counts as an empty tick.
    async fn read_answer(&self, request: &ConversationRequest) -> Option<String> {
        let batch = match self.transport.read_batch().await {
            Ok(batch) => batch,
            Err(error) => {
                warn!(conversation_id = %self.conversation_id, error = %error, "conversation read failed");
                if let Err(error) = self.transport.connect().await {
                    warn!(conversation_id = %self.conversation_id, error = %error, "conversation reconnect failed");
                }
                return None;
            }
        };

        extract_answer(&batch)
            .filter(|candidate| candidate.is_from(&request.user, &request.channel))
            .map(|candidate| normalize_command(&candidate.text))
    }

    async fn say(&self, channel: &str, text: &str) {
        if let Err(error) = self.transport.send(channel, text).await {
            warn!(conversation_id = %self.conversation_id, channel, error = %error, "conversation send failed");
        }
    }
}
