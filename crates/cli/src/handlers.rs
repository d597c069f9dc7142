use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_slack::{
    Bot, CommandHandler, ConversationRequest, DefaultCommandHandler, PlatformError, Sender,
};
use tokio::task::JoinHandle;
use tracing::warn;

pub const COFFEE_QUESTION: &str = "Would you like some coffee?";
pub const COFFEE_SERVED: &str = "Here you go :coffee:";
pub const NO_COFFEE: &str = "Sure no coffee today";

/// Demo handler: greets on `hi` / `what's up`, then offers coffee on a
/// dedicated connection so polling continues while the user decides.
#[derive(Clone, Default)]
pub struct CoffeeHandler {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CoffeeHandler {
    /// Waits for every coffee conversation started so far.
    pub async fn finish(&self) {
        let pending = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };
        for conversation in pending {
            if let Err(error) = conversation.await {
                warn!(error = %error, "coffee conversation task failed");
            }
        }
    }

    fn track(&self, conversation: JoinHandle<()>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|task| !task.is_finished());
            pending.push(conversation);
        }
    }
}

fn is_greeting(command: &str) -> bool {
    ["hi", "what's up"]
        .iter()
        .any(|greeting| command == *greeting || command.starts_with(&format!("{greeting} ")))
}

#[async_trait]
impl CommandHandler for CoffeeHandler {
    async fn handle_command(
        &self,
        bot: &Bot,
        command: &str,
        channel: &str,
        sender: &Sender,
    ) -> anyhow::Result<()> {
        if !is_greeting(command) {
            return DefaultCommandHandler.handle_command(bot, command, channel, sender).await;
        }

        let greeting = match sender.mention() {
            Some(mention) => format!("Hi {mention}"),
            None => format!("Hi {}", sender.display()),
        };
        bot.post_message(channel, &greeting).await?;

        let Some(user) = sender.id.clone() else {
            return Ok(());
        };
        let request =
            bot.conversation(COFFEE_QUESTION, ["yes", "no"], channel, user).dedicated_connection(true);
        let bot = bot.clone();
        self.track(tokio::spawn(async move {
            if let Err(error) = serve_coffee(&bot, &request).await {
                warn!(channel = %request.channel, error = %error, "failed to serve coffee");
            }
        }));
        Ok(())
    }
}

async fn serve_coffee(bot: &Bot, request: &ConversationRequest) -> Result<(), PlatformError> {
    let reply = match bot.wait_for_answer_from_user(request).await.as_deref() {
        Some("yes") => COFFEE_SERVED,
        _ => NO_COFFEE,
    };
    bot.post_message(&request.channel, reply).await?;
    Ok(())
}
