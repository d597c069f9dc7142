use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    bot::Bot,
    commands::{mention_token, normalize_command, ParsedCommand},
};

pub const UNKNOWN_COMMAND_REPLY: &str = "Have no idea what to answer you ¯\\_(ツ)_/¯";

/// Who sent a command. The name is only present when the directory lookup
/// succeeded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sender {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Sender {
    pub fn display(&self) -> &str {
        self.name.as_deref().or(self.id.as_deref()).unwrap_or("unknown")
    }

    pub fn mention(&self) -> Option<String> {
        self.id.as_deref().map(mention_token)
    }
}

/// Reacts to one normalized command. Errors are not caught by the dispatcher;
/// they end the poll loop.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_command(
        &self,
        bot: &Bot,
        command: &str,
        channel: &str,
        sender: &Sender,
    ) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCommandHandler;

#[async_trait]
impl CommandHandler for DefaultCommandHandler {
    async fn handle_command(
        &self,
        bot: &Bot,
        command: &str,
        channel: &str,
        sender: &Sender,
    ) -> anyhow::Result<()> {
        info!(
            event_name = "dispatch.command_unhandled",
            bot_name = %bot.name(),
            command,
            channel,
            user = sender.display(),
            "no handler understood command"
        );
        bot.send_message(channel, UNKNOWN_COMMAND_REPLY).await?;
        Ok(())
    }
}

/// Routes parsed commands to the one handler chosen at construction.
#[derive(Clone)]
pub struct CommandDispatcher {
    handler: Arc<dyn CommandHandler>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(DefaultCommandHandler))
    }
}

impl CommandDispatcher {
    pub fn new(handler: Arc<dyn CommandHandler>) -> Self {
        Self { handler }
    }

    pub async fn dispatch(&self, bot: &Bot, command: &ParsedCommand) -> anyhow::Result<()> {
        let text = normalize_command(&command.text);
        let sender = Sender { id: command.user_id.clone(), name: command.user_name.clone() };

        info!(
            event_name = "dispatch.command_received",
            bot_name = %bot.name(),
            command = %text,
            channel = %command.channel,
            user = sender.display(),
            "dispatching command"
        );
        self.handler.handle_command(bot, &text, &command.channel, &sender).await
    }
}

#[cfg(test)]
mod tests {
    use super::Sender;

    #[test]
    fn sender_display_prefers_name_then_id() {
        let named = Sender { id: Some("U1".to_owned()), name: Some("ada".to_owned()) };
        let anonymous = Sender { id: Some("U1".to_owned()), name: None };

        assert_eq!(named.display(), "ada");
        assert_eq!(anonymous.display(), "U1");
        assert_eq!(Sender::default().display(), "unknown");
        assert_eq!(anonymous.mention().as_deref(), Some("<@U1>"));
        assert_eq!(Sender::default().mention(), None);
    }
}
