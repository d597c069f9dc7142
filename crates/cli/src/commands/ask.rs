use parley_core::{init_logging, ApplicationError};
use parley_slack::{ConversationOutcome, DefaultCommandHandler};

use crate::commands::{connect_bot, load_config, runtime, CommandResult};

pub struct AskArgs<'a> {
    pub channel: &'a str,
    pub user: &'a str,
    pub question: &'a str,
    pub answers: &'a [String],
    pub ticks: Option<u32>,
}

/// Asks one question and reports how the conversation ended. A cancelled or
/// expired wait is still a successful run.
pub fn run(args: AskArgs<'_>) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let runtime = match runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let bot = connect_bot::<DefaultCommandHandler>(&config, None).await?;
        let mut request = bot.conversation(args.question, args.answers, args.channel, args.user);
        if let Some(ticks) = args.ticks {
            request = request.max_wait_ticks(ticks);
        }
        let outcome = bot.converse(&request).await;
        if let Err(error) = bot.disconnect().await {
            tracing::warn!(error = %error, "failed to close bot connection");
        }
        Ok::<_, ApplicationError>(outcome)
    });

    match result {
        Ok(ConversationOutcome::Answered(answer)) => {
            CommandResult::success("ask", format!("answered: {answer}"))
        }
        Ok(ConversationOutcome::Cancelled) => CommandResult::success("ask", "cancelled by user"),
        Ok(ConversationOutcome::Expired) => CommandResult::success("ask", "no answer before expiry"),
        Ok(ConversationOutcome::ConnectionFailed) => CommandResult::from_error(
            "ask",
            &ApplicationError::Connection(
                "could not open the conversation stream".to_owned(),
            ),
        ),
        Err(error) => CommandResult::from_error("ask", &error),
    }
}
