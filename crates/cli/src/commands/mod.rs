pub mod ask;
pub mod config;
pub mod doctor;
pub mod post;
pub mod run;

use std::sync::Arc;

use parley_core::{
    config::{AppConfig, LoadOptions},
    ApplicationError,
};
use parley_slack::{socket::SocketModeFactory, Bot, BotSettings, CommandHandler};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        Self::failure(
            command,
            error.error_class(),
            format!("{} ({error})", error.user_message()),
            error.exit_code(),
        )
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::from_error(command, &ApplicationError::Configuration(error.to_string()))
    })
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            1,
        )
    })
}

/// Builds a bot on Socket Mode connections described by `config`.
pub(crate) async fn connect_bot<H>(
    config: &AppConfig,
    handler: Option<H>,
) -> Result<Bot, ApplicationError>
where
    H: CommandHandler + 'static,
{
    let factory = SocketModeFactory::from_config(config)
        .map_err(|error| ApplicationError::Connection(error.to_string()))?;
    let mut builder = Bot::builder(config.slack.bot_id.clone(), Arc::new(factory))
        .settings(BotSettings::from_config(config));
    if let Some(handler) = handler {
        builder = builder.handler(handler);
    }
    Ok(builder.build().await?)
}
