use serde_json::{json, Value};
use thiserror::Error;

use crate::transport::{SlackTransport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("`{method}` was rejected by the platform: {error}")]
    NotOk { method: String, error: String },
    #[error("`{method}` returned an unexpected payload: {reason}")]
    Decode { method: String, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PlatformError {
    pub fn method(&self) -> &str {
        match self {
            Self::NotOk { method, .. } | Self::Decode { method, .. } => method,
            Self::Transport(TransportError::Request { method, .. }) => method,
            Self::Transport(_) => "transport",
        }
    }
}

/// Fails with the platform's own error string when `ok` is not `true`.
pub fn ensure_ok(method: &str, reply: &Value) -> Result<(), PlatformError> {
    if reply.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = reply.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(PlatformError::NotOk { method: method.to_owned(), error: error.to_owned() })
}

/// A message the bot posted, carrying enough to react to it later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub ts: String,
    pub channel: String,
    pub text: String,
}

impl PostedMessage {
    fn from_reply(reply: &Value, channel: &str, text: &str) -> Result<Self, PlatformError> {
        let message = reply.get("message");
        let field = |key: &str| {
            message
                .and_then(|message| message.get(key))
                .or_else(|| reply.get(key))
                .and_then(Value::as_str)
                .map(str::to_owned)
        };

        let ts = field("ts").ok_or_else(|| PlatformError::Decode {
            method: "chat.postMessage".to_owned(),
            reason: "response missing ts".to_owned(),
        })?;
        Ok(Self {
            ts,
            channel: reply
                .get("channel")
                .and_then(Value::as_str)
                .unwrap_or(channel)
                .to_owned(),
            text: field("text").unwrap_or_else(|| text.to_owned()),
        })
    }
}

pub async fn post_message(
    transport: &dyn SlackTransport,
    channel: &str,
    text: &str,
) -> Result<PostedMessage, PlatformError> {
    let method = "chat.postMessage";
    let reply = transport.call(method, json!({ "channel": channel, "text": text })).await?;
    ensure_ok(method, &reply)?;
    PostedMessage::from_reply(&reply, channel, text)
}

/// `emoji` may be given with or without surrounding colons.
pub async fn add_reaction(
    transport: &dyn SlackTransport,
    message: &PostedMessage,
    emoji: &str,
    channel: &str,
) -> Result<(), PlatformError> {
    let method = "reactions.add";
    let reply = transport
        .call(
            method,
            json!({
                "channel": channel,
                "name": emoji.trim_matches(':'),
                "timestamp": message.ts,
            }),
        )
        .await?;
    ensure_ok(method, &reply)
}
