use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("platform call `{method}` failed: {error}")]
    Platform { method: String, error: String },
    #[error("command handler failure: {0}")]
    Handler(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Platform { .. } => "platform",
            Self::Handler(_) => "handler",
            Self::Configuration(_) => "config_validation",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Connection(_) => 3,
            Self::Platform { .. } => 4,
            Self::Handler(_) => 5,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Connection(_) => {
                "Connection failed. Check the Slack app token, bot token and bot id."
            }
            Self::Platform { .. } => "Slack rejected the request. See the error for details.",
            Self::Handler(_) => "A command handler failed and polling was stopped.",
            Self::Configuration(_) => "Configuration is invalid. Fix it and try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ApplicationError;

    #[test]
    fn configuration_error_maps_to_validation_class() {
        let error = ApplicationError::Configuration("slack.bot_id is required".to_owned());

        assert_eq!(error.error_class(), "config_validation");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn platform_error_carries_method_and_platform_text() {
        let error = ApplicationError::Platform {
            method: "reactions.add".to_owned(),
            error: "already_reacted".to_owned(),
        };

        assert_eq!(error.to_string(), "platform call `reactions.add` failed: already_reacted");
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn exit_codes_are_distinct_per_class() {
        let codes = [
            ApplicationError::Connection("x".to_owned()).exit_code(),
            ApplicationError::Platform { method: "m".to_owned(), error: "e".to_owned() }
                .exit_code(),
            ApplicationError::Handler("x".to_owned()).exit_code(),
            ApplicationError::Configuration("x".to_owned()).exit_code(),
        ];

        for (index, code) in codes.iter().enumerate() {
            assert!(!codes[index + 1..].contains(code), "exit code {code} is reused");
        }
    }

    #[test]
    fn connection_error_has_user_safe_message() {
        let error = ApplicationError::Connection("invalid_auth".to_owned());
        assert!(!error.user_message().contains("invalid_auth"));
    }
}
