//! Wire frames exchanged on the persistent channel
//!
//! The backend speaks a mixed protocol: literal keep-alive strings, tagged
//! JSON objects for price pushes and chat answers, and a legacy plain-text
//! chat-answer form with no framing at all.

use serde_json::Value;
use uuid::Uuid;

/// A chat answer received on the channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAnswer {
    /// Correlation id; legacy plain-text answers carry none
    pub id: Option<Uuid>,
    pub answer: String,
    pub confidence: Option<f64>,
}

/// Inbound frame shapes recognized on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Keep-alive from the remote side; answered with a pong, never surfaced
    Ping,
    /// Ignored
    Pong,
    /// `{"type":"price_update","data":{"price":N}}`
    PriceUpdate(f64),
    /// Tagged JSON answer, or a legacy plain-text frame
    ChatAnswer(ChannelAnswer),
}

impl InboundFrame {
    /// Parse a text frame. Returns None for malformed JSON payloads, which
    /// the manager logs and drops.
    pub fn parse(raw: &str) -> Option<InboundFrame> {
        match raw {
            "ping" => return Some(InboundFrame::Ping),
            "pong" => return Some(InboundFrame::Pong),
            _ => {}
        }

        if raw.trim_start().starts_with('{') {
            let value: Value = serde_json::from_str(raw).ok()?;
            return match value.get("type").and_then(Value::as_str) {
                Some("price_update") => {
                    let price = value.pointer("/data/price").and_then(Value::as_f64)?;
                    Some(InboundFrame::PriceUpdate(price))
                }
                Some("chat_answer") => {
                    let answer = value.get("answer").and_then(Value::as_str)?.to_string();
                    let id = value
                        .get("id")
                        .and_then(Value::as_str)
                        .and_then(|s| Uuid::parse_str(s).ok());
                    let confidence = value.get("confidence").and_then(Value::as_f64);
                    Some(InboundFrame::ChatAnswer(ChannelAnswer {
                        id,
                        answer,
                        confidence,
                    }))
                }
                _ => None,
            };
        }

        // Legacy: a bare text frame is a chat answer
        Some(InboundFrame::ChatAnswer(ChannelAnswer {
            id: None,
            answer: raw.to_string(),
            confidence: None,
        }))
    }
}

/// Outbound frame shapes
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// JSON-encoded command object
    Command(Value),
    /// Legacy plain-text chat form: `chat:<message>`
    LegacyChat(String),
    /// Keep-alive reply
    Pong,
}

impl OutboundFrame {
    /// Chat command in the JSON wire form
    pub fn chat(id: Uuid, message: &str, screen_state: &Value) -> Self {
        OutboundFrame::Command(serde_json::json!({
            "type": "chat",
            "id": id.to_string(),
            "message": message,
            "screen_state": screen_state,
        }))
    }

    pub fn encode(&self) -> String {
        match self {
            OutboundFrame::Command(value) => value.to_string(),
            OutboundFrame::LegacyChat(message) => format!("chat:{message}"),
            OutboundFrame::Pong => "pong".to_string(),
        }
    }
}
