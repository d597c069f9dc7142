use parley_core::{init_logging, ApplicationError};
use parley_slack::DefaultCommandHandler;

use crate::commands::{connect_bot, load_config, runtime, CommandResult};

pub fn run(channel: &str, text: &str, reaction: Option<&str>) -> CommandResult {
    let config = match load_config("post") {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let runtime = match runtime("post") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let bot = connect_bot::<DefaultCommandHandler>(&config, None).await?;
        let posted = bot.post_message(channel, text).await.map_err(ApplicationError::from)?;
        if let Some(emoji) = reaction {
            bot.add_reaction(&posted, emoji, &posted.channel)
                .await
                .map_err(ApplicationError::from)?;
        }
        Ok::<_, ApplicationError>(posted)
    });

    match result {
        Ok(posted) => CommandResult::success(
            "post",
            format!("posted to {} at ts {}", posted.channel, posted.ts),
        ),
        Err(error) => CommandResult::from_error("post", &error),
    }
}
