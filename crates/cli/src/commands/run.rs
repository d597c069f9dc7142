use std::time::Duration;

use parley_core::{init_logging, ApplicationError};
use parley_slack::PollMode;
use tracing::{info, warn};

use crate::{
    commands::{connect_bot, load_config, runtime, CommandResult},
    handlers::CoffeeHandler,
};

/// Polls with the coffee demo handler. `seconds` bounds the run; otherwise the
/// configured poll mode applies and ctrl-c stops it.
pub fn run(seconds: Option<u64>) -> CommandResult {
    let config = match load_config("run") {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let runtime = match runtime("run") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let mode = seconds
        .map(|seconds| PollMode::Bounded(Duration::from_secs(seconds)))
        .unwrap_or_else(|| PollMode::from_config(&config.bot));

    let result = runtime.block_on(async {
        let handler = CoffeeHandler::default();
        let bot = connect_bot(&config, Some(handler.clone())).await?;

        let polled = tokio::select! {
            polled = bot.poll(mode) => polled.map_err(ApplicationError::from),
            _ = tokio::signal::ctrl_c() => {
                info!(event_name = "bot.shutdown_requested", bot_name = %bot.name(), "shutdown requested");
                Ok(())
            }
        };

        handler.finish().await;
        if let Err(error) = bot.disconnect().await {
            warn!(error = %error, "failed to close bot connection");
        }
        polled.map(|()| bot.name().to_owned())
    });

    match result {
        Ok(name) => CommandResult::success("run", format!("{name} stopped polling")),
        Err(error) => CommandResult::from_error("run", &error),
    }
}
