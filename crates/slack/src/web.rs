use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::transport::TransportError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin Web API client. Every method is a form POST with the bot token as a
/// bearer credential; the raw JSON reply is returned so callers can inspect
/// the platform's `ok` flag themselves.
#[derive(Clone)]
pub struct WebApiClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl std::fmt::Debug for WebApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl WebApiClient {
    pub fn new(base_url: &str, bot_token: SecretString) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("parley-bot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| TransportError::Connect(format!("http client: {error}")))?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), bot_token })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn call(&self, method: &str, params: &Value) -> Result<Value, TransportError> {
        self.post(method, self.bot_token.expose_secret(), params).await
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<Value, TransportError> {
        self.call("chat.postMessage", &serde_json::json!({ "channel": channel, "text": text }))
            .await
    }

    /// Asks for a Socket Mode websocket URL. Uses the app-level token, not the
    /// bot token.
    pub async fn open_socket_url(&self, app_token: &SecretString) -> Result<String, TransportError> {
        let method = "apps.connections.open";
        let reply = self.post(method, app_token.expose_secret(), &Value::Null).await?;

        if reply.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = reply.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(TransportError::Connect(format!("{method} rejected: {error}")));
        }
        reply
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .map(str::to_owned)
            .ok_or_else(|| TransportError::Connect(format!("{method} did not return url")))
    }

    async fn post(&self, method: &str, token: &str, params: &Value) -> Result<Value, TransportError> {
        let request_failed =
            |reason: String| TransportError::Request { method: method.to_owned(), reason };

        debug!(method, "calling web api");
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token)
            .form(&form_fields(params))
            .send()
            .await
            .map_err(|error| request_failed(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_failed(format!("http status {status}")));
        }

        response.json::<Value>().await.map_err(|error| request_failed(format!("decode: {error}")))
    }
}

// Nested values are sent as JSON text, which is how the Web API expects
// arguments like `blocks` or `attachments` in form posts.
fn form_fields(params: &Value) -> Vec<(String, String)> {
    let Some(object) = params.as_object() else {
        return Vec::new();
    };

    object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
