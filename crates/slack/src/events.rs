use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message event as read from the event stream. Any field may be missing;
/// the parsers decide which ones they need.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, rename = "ts")]
    pub timestamp: Option<String>,
}

impl InboundEvent {
    pub fn message(
        channel: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            text: Some(text.into()),
            channel: Some(channel.into()),
            user: Some(user.into()),
            timestamp: None,
        }
    }
}

/// A decoded Socket Mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    /// Anything carrying an `envelope_id`. Slack redelivers envelopes that are
    /// not acknowledged, so every one of them is acked even when `event` is
    /// `None`.
    Envelope { envelope_id: String, event: Option<InboundEvent> },
    Unsupported { frame_type: String },
}

pub fn decode_socket_frame(raw: &str) -> SocketFrame {
    let Ok(frame) = serde_json::from_str::<Value>(raw) else {
        return SocketFrame::Unsupported { frame_type: "malformed".to_owned() };
    };
    let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or_default();

    if let Some(envelope_id) = frame.get("envelope_id").and_then(Value::as_str) {
        let event = if frame_type == "events_api" {
            frame.pointer("/payload/event").and_then(message_event)
        } else {
            None
        };
        return SocketFrame::Envelope { envelope_id: envelope_id.to_owned(), event };
    }

    match frame_type {
        "hello" => SocketFrame::Hello,
        "disconnect" => SocketFrame::Disconnect {
            reason: frame.get("reason").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
        },
        other => SocketFrame::Unsupported { frame_type: other.to_owned() },
    }
}

fn message_event(event: &Value) -> Option<InboundEvent> {
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }

    let field = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_owned);
    Some(InboundEvent {
        text: field("text"),
        channel: field("channel"),
        user: field("user"),
        timestamp: field("ts"),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_socket_frame, InboundEvent, SocketFrame};

    #[test]
    fn decodes_message_envelope() {
        let raw = r#"{
            "envelope_id": "env-1",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": {
                "type": "event_callback",
                "event": {
                    "type": "message",
                    "text": "<@UBOT> hi",
                    "user": "U1",
                    "channel": "C1",
                    "ts": "1730000000.1000"
                }
            }
        }"#;

        let frame = decode_socket_frame(raw);
        assert_eq!(
            frame,
            SocketFrame::Envelope {
                envelope_id: "env-1".to_owned(),
                event: Some(InboundEvent {
                    text: Some("<@UBOT> hi".to_owned()),
                    channel: Some("C1".to_owned()),
                    user: Some("U1".to_owned()),
                    timestamp: Some("1730000000.1000".to_owned()),
                }),
            }
        );
    }

    #[test]
    fn non_message_envelopes_are_still_acknowledgeable() {
        let raw = r#"{
            "envelope_id": "env-2",
            "type": "events_api",
            "payload": {"event": {"type": "reaction_added", "user": "U1"}}
        }"#;

        assert_eq!(
            decode_socket_frame(raw),
            SocketFrame::Envelope { envelope_id: "env-2".to_owned(), event: None }
        );
    }

    #[test]
    fn slash_command_envelopes_carry_no_event() {
        let raw = r#"{"envelope_id": "env-3", "type": "slash_commands", "payload": {}}"#;
        assert_eq!(
            decode_socket_frame(raw),
            SocketFrame::Envelope { envelope_id: "env-3".to_owned(), event: None }
        );
    }

    #[test]
    fn decodes_control_frames() {
        assert_eq!(decode_socket_frame(r#"{"type": "hello", "num_connections": 1}"#), SocketFrame::Hello);
        assert_eq!(
            decode_socket_frame(r#"{"type": "disconnect", "reason": "refresh_requested"}"#),
            SocketFrame::Disconnect { reason: "refresh_requested".to_owned() }
        );
    }

    #[test]
    fn malformed_frames_are_reported_as_unsupported() {
        assert_eq!(
            decode_socket_frame("not json"),
            SocketFrame::Unsupported { frame_type: "malformed".to_owned() }
        );
    }
}
