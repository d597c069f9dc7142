//! In-memory transports for exercising bots without a Slack workspace.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    events::InboundEvent,
    transport::{SlackTransport, TransportError, TransportFactory},
};

/// One outbound `send`, stamped with how many reads had happened before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
    pub after_reads: usize,
}

#[derive(Default)]
struct ScriptedState {
    connect_results: VecDeque<Result<(), TransportError>>,
    batches: VecDeque<Result<Vec<InboundEvent>, TransportError>>,
    queued_responses: HashMap<String, VecDeque<Result<Value, TransportError>>>,
    fixed_responses: HashMap<String, Value>,
    send_failures: VecDeque<TransportError>,
    sent: Vec<SentMessage>,
    calls: Vec<(String, Value)>,
    connect_attempts: usize,
    disconnects: usize,
    reads: usize,
    posted: usize,
}

/// Transport driven by a script. Reads past the end of the script return
/// empty batches, unscripted calls answer `{"ok": true}`.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptedState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(batches: Vec<Vec<InboundEvent>>) -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                batches: batches.into_iter().map(Ok).collect(),
                ..ScriptedState::default()
            }),
        }
    }

    pub async fn push_batch(&self, batch: Vec<InboundEvent>) {
        self.state.lock().await.batches.push_back(Ok(batch));
    }

    /// Queues `count` empty reads, used to advance a session's tick counter.
    pub async fn push_idle(&self, count: usize) {
        let mut state = self.state.lock().await;
        state.batches.extend((0..count).map(|_| Ok(Vec::new())));
    }

    pub async fn push_read_error(&self, error: TransportError) {
        self.state.lock().await.batches.push_back(Err(error));
    }

    pub async fn push_connect_result(&self, result: Result<(), TransportError>) {
        self.state.lock().await.connect_results.push_back(result);
    }

    pub async fn fail_next_send(&self, error: TransportError) {
        self.state.lock().await.send_failures.push_back(error);
    }

    /// Answers every call to `method` with `reply` once queued replies run out.
    pub async fn respond_with(&self, method: &str, reply: Value) {
        self.state.lock().await.fixed_responses.insert(method.to_owned(), reply);
    }

    pub async fn queue_response(&self, method: &str, reply: Value) {
        let mut state = self.state.lock().await;
        state.queued_responses.entry(method.to_owned()).or_default().push_back(Ok(reply));
    }

    pub async fn fail_call(&self, method: &str, error: TransportError) {
        let mut state = self.state.lock().await;
        state.queued_responses.entry(method.to_owned()).or_default().push_back(Err(error));
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.state.lock().await.sent.iter().map(|message| message.text.clone()).collect()
    }

    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_to(&self, method: &str) -> usize {
        self.state.lock().await.calls.iter().filter(|(name, _)| name == method).count()
    }

    pub async fn connect_attempts(&self) -> usize {
        self.state.lock().await.connect_attempts
    }

    pub async fn disconnects(&self) -> usize {
        self.state.lock().await.disconnects
    }

    pub async fn reads(&self) -> usize {
        self.state.lock().await.reads
    }
}

#[async_trait]
impl SlackTransport for ScriptedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.connect_attempts += 1;
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn read_batch(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let mut state = self.state.lock().await;
        state.reads += 1;
        state.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }
        let after_reads = state.reads;
        state.sent.push(SentMessage {
            channel: channel.to_owned(),
            text: text.to_owned(),
            after_reads,
        });
        Ok(())
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        state.calls.push((method.to_owned(), params.clone()));

        if let Some(reply) =
            state.queued_responses.get_mut(method).and_then(|queue| queue.pop_front())
        {
            return reply;
        }
        if let Some(reply) = state.fixed_responses.get(method) {
            return Ok(reply.clone());
        }
        if method == "chat.postMessage" {
            state.posted += 1;
            return Ok(json!({
                "ok": true,
                "channel": params.get("channel").cloned().unwrap_or(Value::Null),
                "ts": format!("1700000000.{:06}", state.posted),
                "message": {"text": params.get("text").cloned().unwrap_or(Value::Null)},
            }));
        }
        Ok(json!({ "ok": true }))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.lock().await.disconnects += 1;
        Ok(())
    }
}

/// Hands out preset transports in order, then fresh empty ones.
#[derive(Default)]
pub struct ScriptedFactory {
    queued: std::sync::Mutex<VecDeque<Arc<ScriptedTransport>>>,
    opened: std::sync::Mutex<Vec<Arc<ScriptedTransport>>>,
}

impl ScriptedFactory {
    pub fn new(transports: Vec<Arc<ScriptedTransport>>) -> Self {
        Self { queued: std::sync::Mutex::new(transports.into()), opened: Default::default() }
    }

    pub fn opened(&self) -> Vec<Arc<ScriptedTransport>> {
        self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
    }
}

impl TransportFactory for ScriptedFactory {
    fn open(&self) -> Arc<dyn SlackTransport> {
        let transport = self
            .queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .unwrap_or_default();
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(transport.clone());
        }
        transport
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{ScriptedFactory, ScriptedTransport};
    use crate::{
        events::InboundEvent,
        transport::{SlackTransport, TransportError, TransportFactory},
    };

    #[tokio::test]
    async fn script_runs_in_order_then_goes_idle() {
        let transport =
            ScriptedTransport::with_batches(vec![vec![InboundEvent::message("C1", "U1", "hi")]]);
        transport.push_read_error(TransportError::Receive("gone".to_owned())).await;

        assert_eq!(transport.read_batch().await.expect("first").len(), 1);
        assert!(transport.read_batch().await.is_err());
        assert!(transport.read_batch().await.expect("idle").is_empty());
        assert_eq!(transport.reads().await, 3);
    }

    #[tokio::test]
    async fn sends_are_stamped_with_read_count() {
        let transport = ScriptedTransport::new();
        transport.send("C1", "before").await.expect("send");
        transport.push_idle(2).await;
        let _ = transport.read_batch().await;
        let _ = transport.read_batch().await;
        transport.send("C1", "after").await.expect("send");

        let sent = transport.sent().await;
        assert_eq!(sent[0].after_reads, 0);
        assert_eq!(sent[1].after_reads, 2);
    }

    #[tokio::test]
    async fn queued_replies_take_precedence_over_fixed() {
        let transport = ScriptedTransport::new();
        transport.respond_with("auth.test", json!({"ok": true, "user": "fixed"})).await;
        transport.queue_response("auth.test", json!({"ok": true, "user": "once"})).await;

        let first = transport.call("auth.test", json!({})).await.expect("first");
        let second = transport.call("auth.test", json!({})).await.expect("second");
        let unscripted = transport.call("users.list", json!({})).await.expect("default");

        assert_eq!(first["user"], "once");
        assert_eq!(second["user"], "fixed");
        assert_eq!(unscripted, json!({"ok": true}));
    }

    #[test]
    fn factory_hands_out_preset_transports_first() {
        let preset = Arc::new(ScriptedTransport::new());
        let factory = ScriptedFactory::new(vec![preset.clone()]);

        let _first = factory.open();
        let _second = factory.open();

        let opened = factory.opened();
        assert_eq!(opened.len(), 2);
        assert!(Arc::ptr_eq(&opened[0], &preset));
        assert!(!Arc::ptr_eq(&opened[1], &preset));
    }
}
