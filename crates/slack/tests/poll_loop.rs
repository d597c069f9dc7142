use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use parley_slack::{
    events::InboundEvent,
    handler::UNKNOWN_COMMAND_REPLY,
    socket::ReconnectPolicy,
    testing::{ScriptedFactory, ScriptedTransport},
    Bot, BotError, BotSettings, CommandHandler, PollMode, Sender, TransportError,
};
use serde_json::json;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Seen {
    command: String,
    channel: String,
    sender: Sender,
}

#[derive(Clone, Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Vec<Seen>>>,
    fail_on: Option<&'static str>,
}

impl RecordingHandler {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    async fn handle_command(
        &self,
        _bot: &Bot,
        command: &str,
        channel: &str,
        sender: &Sender,
    ) -> anyhow::Result<()> {
        self.seen.lock().expect("seen lock").push(Seen {
            command: command.to_owned(),
            channel: channel.to_owned(),
            sender: sender.clone(),
        });
        if self.fail_on == Some(command) {
            anyhow::bail!("handler refused `{command}`");
        }
        Ok(())
    }
}

fn settings() -> BotSettings {
    BotSettings {
        tick_interval: Duration::from_secs(1),
        reconnect_policy: ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        ..BotSettings::default()
    }
}

async fn bot_with(transport: &Arc<ScriptedTransport>, handler: RecordingHandler) -> Bot {
    let factory = Arc::new(ScriptedFactory::new(vec![transport.clone()]));
    Bot::builder("UBOT", factory).handler(handler).settings(settings()).build().await.expect("bot")
}

#[tokio::test(start_paused = true)]
async fn bounded_poll_dispatches_directed_commands_until_deadline() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_with(
            "users.list",
            json!({"ok": true, "members": [
                {"id": "UBOT", "name": "coffeebot", "is_bot": true},
                {"id": "U1", "name": "ada"}
            ]}),
        )
        .await;
    transport
        .push_batch(vec![
            InboundEvent::message("C1", "U2", "just chatting"),
            InboundEvent::message("C1", "U1", "<@UBOT>   What's   UP"),
        ])
        .await;
    transport.push_batch(vec![InboundEvent::message("C2", "U1", "hey <@UBOT>: Deploy")]).await;
    let handler = RecordingHandler::default();
    let bot = bot_with(&transport, handler.clone()).await;
    assert_eq!(bot.name(), "coffeebot");

    bot.poll(PollMode::Bounded(Duration::from_secs(3))).await.expect("poll ends cleanly");

    let ada = Sender { id: Some("U1".to_owned()), name: Some("ada".to_owned()) };
    assert_eq!(
        handler.seen(),
        vec![
            Seen { command: "what's up".to_owned(), channel: "C1".to_owned(), sender: ada.clone() },
            Seen { command: "deploy".to_owned(), channel: "C2".to_owned(), sender: ada },
        ]
    );
    assert_eq!(transport.reads().await, 3);
}

#[tokio::test(start_paused = true)]
async fn bare_mentions_and_undirected_messages_are_not_dispatched() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "<@UBOT>")]).await;
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "hello everyone")]).await;
    let handler = RecordingHandler::default();
    let bot = bot_with(&transport, handler.clone()).await;

    bot.poll(PollMode::Bounded(Duration::from_secs(2))).await.expect("poll");

    assert!(handler.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn default_handler_replies_that_it_does_not_understand() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "<@UBOT> dance")]).await;
    let factory = Arc::new(ScriptedFactory::new(vec![transport.clone()]));
    let bot = Bot::builder("UBOT", factory).settings(settings()).build().await.expect("bot");
    assert_eq!(bot.name(), "Nameless bot");

    bot.poll(PollMode::Bounded(Duration::from_secs(1))).await.expect("poll");

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "C1");
    assert_eq!(sent[0].text, UNKNOWN_COMMAND_REPLY);
}

#[tokio::test(start_paused = true)]
async fn handler_failure_stops_polling_and_propagates() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "<@UBOT> explode")]).await;
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "<@UBOT> after")]).await;
    let handler = RecordingHandler { fail_on: Some("explode"), ..RecordingHandler::default() };
    let bot = bot_with(&transport, handler.clone()).await;

    let error = bot.poll(PollMode::NonStop).await.expect_err("handler failure surfaces");

    assert!(matches!(error, BotError::Handler(_)));
    assert!(error.to_string().contains("handler refused `explode`"));
    assert_eq!(handler.seen().len(), 1);
    assert_eq!(transport.reads().await, 1);
}

#[tokio::test]
async fn failed_connect_is_a_boot_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_connect_result(Err(TransportError::Connect("invalid_auth".to_owned()))).await;
    let bot = bot_with(&transport, RecordingHandler::default()).await;

    let error = bot.poll(PollMode::NonStop).await.expect_err("connect fails");

    assert!(matches!(
        &error,
        BotError::Connection { source: TransportError::Connect(reason), .. } if reason == "invalid_auth"
    ));
    assert_eq!(transport.reads().await, 0);
}

#[tokio::test(start_paused = true)]
async fn lost_stream_is_reconnected() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_read_error(TransportError::Receive("socket stream closed".to_owned())).await;
    transport.push_batch(vec![InboundEvent::message("C1", "U1", "<@UBOT> ping")]).await;
    let handler = RecordingHandler::default();
    let bot = bot_with(&transport, handler.clone()).await;

    bot.poll(PollMode::Bounded(Duration::from_secs(3))).await.expect("poll");

    assert_eq!(transport.connect_attempts().await, 2);
    assert_eq!(handler.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_surface_the_connection_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_read_error(TransportError::Receive("socket stream closed".to_owned())).await;
    transport.push_connect_result(Ok(())).await;
    transport.push_connect_result(Err(TransportError::Connect("down".to_owned()))).await;
    transport.push_connect_result(Err(TransportError::Connect("still down".to_owned()))).await;
    let bot = bot_with(&transport, RecordingHandler::default()).await;

    let error = bot.poll(PollMode::NonStop).await.expect_err("retries exhausted");

    assert!(matches!(
        &error,
        BotError::Connection { source: TransportError::Connect(reason), .. } if reason == "still down"
    ));
    assert_eq!(transport.connect_attempts().await, 3);
}

#[tokio::test]
async fn outbound_actions_go_through_the_shared_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    let bot = bot_with(&transport, RecordingHandler::default()).await;

    let posted = bot.post_message("C1", "Hello from parley").await.expect("posted");
    bot.add_reaction(&posted, ":coffee:", "C1").await.expect("reacted");
    let raw = bot.custom_api_call("emoji.list", json!({})).await.expect("raw call");

    assert_eq!(posted.channel, "C1");
    assert_eq!(posted.text, "Hello from parley");
    assert_eq!(raw, json!({"ok": true}));
    let calls = transport.calls().await;
    let reaction = calls.iter().find(|(method, _)| method == "reactions.add").expect("reaction call");
    assert_eq!(reaction.1["timestamp"], posted.ts.as_str());
    assert_eq!(reaction.1["name"], "coffee");
}

#[tokio::test]
async fn empty_bot_id_is_rejected() {
    let factory = Arc::new(ScriptedFactory::default());
    let result = Bot::builder("  ", factory).build().await;

    assert!(matches!(result, Err(BotError::Configuration(_))));
}
