use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parley_core::{config::SocketConfig, lossy_text, AppConfig};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::{
    sync::{
        mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};

use crate::{
    events::{decode_socket_frame, InboundEvent, SocketFrame},
    transport::{SlackTransport, TransportError, TransportFactory},
    web::WebApiClient,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &SocketConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

struct Subscriber {
    id: u64,
    events: UnboundedSender<InboundEvent>,
}

struct Subscription {
    id: u64,
    events: UnboundedReceiver<InboundEvent>,
}

#[derive(Default)]
struct Fanout {
    open: bool,
    reader: Option<JoinHandle<()>>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// The one websocket shared by every transport a factory opens.
///
/// Slack hands each envelope to a single connection of the app, so opening a
/// socket per conversation would split the stream. Instead the reader copies
/// every message event to each subscriber, and each subscriber drains its own
/// queue.
struct SocketHub {
    web: Arc<WebApiClient>,
    app_token: SecretString,
    fanout: Arc<Mutex<Fanout>>,
}

impl SocketHub {
    fn new(web: Arc<WebApiClient>, app_token: SecretString) -> Self {
        Self { web, app_token, fanout: Arc::new(Mutex::new(Fanout::default())) }
    }

    /// Registers a new subscriber, opening the websocket first if no reader is
    /// running.
    async fn subscribe(&self) -> Result<Subscription, TransportError> {
        let mut fanout = self.fanout.lock().await;
        if !fanout.open {
            let url = self.web.open_socket_url(&self.app_token).await?;
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|error| TransportError::Connect(error.to_string()))?;
            let (sink, source) = stream.split();
            start_pump(&self.fanout, &mut fanout, sink, source);
            info!("socket mode connection opened");
        }

        let id = fanout.next_id;
        fanout.next_id += 1;
        let (sender, events) = mpsc::unbounded_channel();
        fanout.subscribers.push(Subscriber { id, events: sender });
        debug!(subscriber = id, subscribers = fanout.subscribers.len(), "socket subscriber added");
        Ok(Subscription { id, events })
    }

    /// Drops a subscriber. The websocket closes with the last one.
    async fn unsubscribe(&self, id: u64) {
        let mut fanout = self.fanout.lock().await;
        fanout.subscribers.retain(|subscriber| subscriber.id != id);
        if fanout.subscribers.is_empty() && fanout.open {
            if let Some(reader) = fanout.reader.take() {
                reader.abort();
            }
            fanout.open = false;
            info!("socket mode connection closed");
        }
    }
}

fn start_pump<Si, St>(handle: &Arc<Mutex<Fanout>>, fanout: &mut Fanout, sink: Si, source: St)
where
    Si: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    let reader = tokio::spawn(pump_socket(sink, source, handle.clone()));
    if let Some(stale) = fanout.reader.replace(reader) {
        stale.abort();
    }
    fanout.open = true;
}

/// Socket Mode connection. `connect` subscribes to the factory's shared
/// websocket; events are buffered per transport until the next `read_batch`.
pub struct SocketModeTransport {
    hub: Arc<SocketHub>,
    subscription: Mutex<Option<Subscription>>,
}

impl SocketModeTransport {
    fn new(hub: Arc<SocketHub>) -> Self {
        Self { hub, subscription: Mutex::new(None) }
    }
}

#[async_trait]
impl SlackTransport for SocketModeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut subscription = self.subscription.lock().await;
        if subscription.as_ref().is_some_and(|live| !live.events.is_closed()) {
            return Ok(());
        }

        let fresh = self.hub.subscribe().await?;
        if let Some(stale) = subscription.replace(fresh) {
            self.hub.unsubscribe(stale.id).await;
        }
        Ok(())
    }

    async fn read_batch(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let mut subscription = self.subscription.lock().await;
        let Some(live) = subscription.as_mut() else {
            return Err(TransportError::Receive("not connected".to_owned()));
        };

        let mut batch = Vec::new();
        loop {
            match live.events.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) => return Ok(batch),
                Err(TryRecvError::Disconnected) => break,
            }
        }

        // Hand out what was buffered before the stream closed; report the
        // closure on the next read.
        if batch.is_empty() {
            subscription.take();
            return Err(TransportError::Receive("socket stream closed".to_owned()));
        }
        Ok(batch)
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let reply = self.hub.web.post_message(channel, text).await?;
        if reply.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }
        let error = reply.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        Err(TransportError::Send(format!("chat.postMessage: {error}")))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.hub.web.call(method, &params).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(live) = self.subscription.lock().await.take() {
            self.hub.unsubscribe(live.id).await;
        }
        Ok(())
    }
}

async fn pump_socket<Si, St>(mut sink: Si, mut source: St, fanout: Arc<Mutex<Fanout>>)
where
    Si: Sink<Message, Error = WsError> + Unpin,
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = source.next().await {
        let raw = match message {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(bytes)) => lossy_text(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                warn!(error = %error, "socket read failed");
                break;
            }
        };

        match decode_socket_frame(&raw) {
            SocketFrame::Hello => debug!("socket mode hello received"),
            SocketFrame::Disconnect { reason } => {
                info!(reason = %reason, "socket mode disconnect requested");
                break;
            }
            SocketFrame::Envelope { envelope_id, event } => {
                let ack = json!({ "envelope_id": envelope_id }).to_string();
                if let Err(error) = sink.send(Message::Text(ack.into())).await {
                    warn!(envelope_id = %envelope_id, error = %error, "failed to acknowledge envelope");
                }
                if let Some(event) = event {
                    fanout
                        .lock()
                        .await
                        .subscribers
                        .retain(|subscriber| subscriber.events.send(event.clone()).is_ok());
                }
            }
            SocketFrame::Unsupported { frame_type } => {
                debug!(frame_type = %frame_type, "ignoring socket frame");
            }
        }
    }

    // Dropping the senders surfaces the closure to every subscriber's next read.
    let mut fanout = fanout.lock().await;
    fanout.open = false;
    fanout.subscribers.clear();
}

/// Opens transports that all read one Socket Mode websocket. Each transport
/// gets its own copy of every message event, so a conversation on a dedicated
/// transport and the poll loop both see the user's reply.
pub struct SocketModeFactory {
    hub: Arc<SocketHub>,
}

impl SocketModeFactory {
    pub fn new(web: Arc<WebApiClient>, app_token: SecretString) -> Self {
        Self { hub: Arc::new(SocketHub::new(web, app_token)) }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        let web = WebApiClient::new(&config.slack.api_base_url, config.slack.bot_token.clone())?;
        Ok(Self::new(Arc::new(web), config.slack.app_token.clone()))
    }
}

impl TransportFactory for SocketModeFactory {
    fn open(&self) -> Arc<dyn SlackTransport> {
        Arc::new(SocketModeTransport::new(self.hub.clone()))
    }
}
