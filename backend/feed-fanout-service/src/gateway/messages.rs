//! Frames exchanged with a live session

use crate::models::FeedItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A new post in the subscriber's feed
    Post { post: FeedItem },
    /// Any non-keepalive client frame, sent back tagged with where it landed
    #[serde(rename_all = "camelCase")]
    Echo {
        instance_id: String,
        connection_id: Uuid,
        payload: Value,
    },
}

impl OutboundMessage {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Keepalive,
    Other(Value),
}

#[derive(Deserialize)]
struct Typed {
    #[serde(rename = "type")]
    kind: String,
}

impl InboundMessage {
    /// `ping`, `{"type": "ping"}` and `{"type": "heartbeat"}` are keepalives.
    /// Text that is not JSON is carried as a string.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("ping") {
            return InboundMessage::Keepalive;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                let is_keepalive = serde_json::from_value::<Typed>(value.clone())
                    .map(|t| matches!(t.kind.as_str(), "ping" | "heartbeat"))
                    .unwrap_or(false);
                if is_keepalive {
                    InboundMessage::Keepalive
                } else {
                    InboundMessage::Other(value)
                }
            }
            Err(_) => InboundMessage::Other(Value::String(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keepalive_forms() {
        assert_eq!(InboundMessage::parse(" PING "), InboundMessage::Keepalive);
        assert_eq!(
            InboundMessage::parse(r#"{"type":"ping"}"#),
            InboundMessage::Keepalive
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"heartbeat","ts":1}"#),
            InboundMessage::Keepalive
        );
    }

    #[test]
    fn test_other_payloads_are_kept() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"hello"}"#),
            InboundMessage::Other(json!({"type": "hello"}))
        );
        assert_eq!(
            InboundMessage::parse("not json {"),
            InboundMessage::Other(json!("not json {"))
        );
    }

    #[test]
    fn test_echo_wire_format() {
        let conn = Uuid::new_v4();
        let text = OutboundMessage::Echo {
            instance_id: "feed-a".into(),
            connection_id: conn,
            payload: json!({"x": 1}),
        }
        .to_text()
        .unwrap();

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "echo");
        assert_eq!(value["instanceId"], "feed-a");
        assert_eq!(value["connectionId"], json!(conn));
        assert_eq!(value["payload"]["x"], 1);
    }
}
