use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::events::InboundEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("platform request `{method}` failed: {reason}")]
    Request { method: String, reason: String },
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// One live connection to the platform.
///
/// `read_batch` never waits for traffic: it drains whatever arrived since the
/// previous call. Every call returns a disjoint slice, so two consumers sharing
/// a transport will each miss the events the other one drained.
#[async_trait]
pub trait SlackTransport: Send + Sync {
    /// Opens the event stream. Must succeed without reconnecting when the
    /// stream is already live.
    async fn connect(&self) -> Result<(), TransportError>;
    async fn read_batch(&self) -> Result<Vec<InboundEvent>, TransportError>;
    async fn send(&self, channel: &str, text: &str) -> Result<(), TransportError>;
    /// Request/response call against the platform Web API. The returned
    /// payload carries the platform's own `ok` flag; callers check it.
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Opens transports with their own event queue. Every transport opened from
/// one factory sees every event, so a conversation never drains events the
/// poll loop needs.
pub trait TransportFactory: Send + Sync {
    fn open(&self) -> Arc<dyn SlackTransport>;
}
