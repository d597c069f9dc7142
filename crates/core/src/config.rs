use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub bot: BotConfig,
    pub directory: DirectoryConfig,
    pub socket: SocketConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub bot_id: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    /// Display name used when the directory has no profile for `slack.bot_id`.
    pub name: String,
    pub tick_interval_ms: u64,
    pub answer_wait_ticks: u32,
    pub non_stop: bool,
    pub poll_delta_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Staleness window for cached user/channel listings. Zero disables caching.
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SocketConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_bot_id: Option<String>,
    pub tick_interval_ms: Option<u64>,
    pub non_stop: Option<bool>,
    pub poll_delta_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                bot_id: String::new(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
            },
            bot: BotConfig {
                name: "Nameless bot".to_string(),
                tick_interval_ms: 1_000,
                answer_wait_ticks: 120,
                non_stop: true,
                poll_delta_secs: 60,
            },
            directory: DirectoryConfig { cache_ttl_secs: 0 },
            socket: SocketConfig { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(bot_id) = slack.bot_id {
                self.slack.bot_id = bot_id;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(bot) = patch.bot {
            if let Some(name) = bot.name {
                self.bot.name = name;
            }
            if let Some(tick_interval_ms) = bot.tick_interval_ms {
                self.bot.tick_interval_ms = tick_interval_ms;
            }
            if let Some(answer_wait_ticks) = bot.answer_wait_ticks {
                self.bot.answer_wait_ticks = answer_wait_ticks;
            }
            if let Some(non_stop) = bot.non_stop {
                self.bot.non_stop = non_stop;
            }
            if let Some(poll_delta_secs) = bot.poll_delta_secs {
                self.bot.poll_delta_secs = poll_delta_secs;
            }
        }

        if let Some(directory) = patch.directory {
            if let Some(cache_ttl_secs) = directory.cache_ttl_secs {
                self.directory.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(socket) = patch.socket {
            if let Some(max_retries) = socket.max_retries {
                self.socket.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = socket.base_delay_ms {
                self.socket.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = socket.max_delay_ms {
                self.socket.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLEY_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("PARLEY_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("PARLEY_SLACK_BOT_ID") {
            self.slack.bot_id = value;
        }
        if let Some(value) = read_env("PARLEY_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("PARLEY_BOT_NAME") {
            self.bot.name = value;
        }
        if let Some(value) = read_env("PARLEY_BOT_TICK_INTERVAL_MS") {
            self.bot.tick_interval_ms = parse_u64("PARLEY_BOT_TICK_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_BOT_ANSWER_WAIT_TICKS") {
            self.bot.answer_wait_ticks = parse_u32("PARLEY_BOT_ANSWER_WAIT_TICKS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_BOT_NON_STOP") {
            self.bot.non_stop = parse_bool("PARLEY_BOT_NON_STOP", &value)?;
        }
        if let Some(value) = read_env("PARLEY_BOT_POLL_DELTA_SECS") {
            self.bot.poll_delta_secs = parse_u64("PARLEY_BOT_POLL_DELTA_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_DIRECTORY_CACHE_TTL_SECS") {
            self.directory.cache_ttl_secs = parse_u64("PARLEY_DIRECTORY_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SOCKET_MAX_RETRIES") {
            self.socket.max_retries = parse_u32("PARLEY_SOCKET_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SOCKET_BASE_DELAY_MS") {
            self.socket.base_delay_ms = parse_u64("PARLEY_SOCKET_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SOCKET_MAX_DELAY_MS") {
            self.socket.max_delay_ms = parse_u64("PARLEY_SOCKET_MAX_DELAY_MS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_bot_id) = overrides.slack_bot_id {
            self.slack.bot_id = slack_bot_id;
        }
        if let Some(tick_interval_ms) = overrides.tick_interval_ms {
            self.bot.tick_interval_ms = tick_interval_ms;
        }
        if let Some(non_stop) = overrides.non_stop {
            self.bot.non_stop = non_stop;
        }
        if let Some(poll_delta_secs) = overrides.poll_delta_secs {
            self.bot.poll_delta_secs = poll_delta_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_bot(&self.bot)?;
        validate_socket(&self.socket)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_id = slack.bot_id.trim();
    if bot_id.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_id is required (the bot user id, e.g. `U0123ABCD`)".to_string(),
        ));
    }
    if !bot_id.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(
            "slack.bot_id must be a bare user id without `<@...>` wrapping".to_string(),
        ));
    }

    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    if bot.name.trim().is_empty() {
        return Err(ConfigError::Validation("bot.name must not be empty".to_string()));
    }

    if bot.tick_interval_ms == 0 || bot.tick_interval_ms > 60_000 {
        return Err(ConfigError::Validation(
            "bot.tick_interval_ms must be in range 1..=60000".to_string(),
        ));
    }

    if !bot.non_stop && bot.poll_delta_secs == 0 {
        return Err(ConfigError::Validation(
            "bot.poll_delta_secs must be greater than zero when bot.non_stop is false".to_string(),
        ));
    }

    Ok(())
}

fn validate_socket(socket: &SocketConfig) -> Result<(), ConfigError> {
    if socket.base_delay_ms > socket.max_delay_ms {
        return Err(ConfigError::Validation(
            "socket.base_delay_ms must not exceed socket.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    bot: Option<BotPatch>,
    directory: Option<DirectoryPatch>,
    socket: Option<SocketPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    bot_id: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    name: Option<String>,
    tick_interval_ms: Option<u64>,
    answer_wait_ticks: Option<u32>,
    non_stop: Option<bool>,
    poll_delta_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryPatch {
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SocketPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
