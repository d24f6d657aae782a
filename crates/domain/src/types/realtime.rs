//! Realtime channel types
//!
//! Frames on the wire are JSON envelopes `{type, data, timestamp?, sender?}`.
//! Inbound envelopes are parsed into [`InboundMessage`] by their `type` tag;
//! outbound messages are built with [`OutboundMessage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::impl_wire_names;

/// Lifecycle state of a realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl_wire_names!(ConnectionState {
    Connecting => "connecting",
    Open => "open",
    Closing => "closing",
    Closed => "closed",
});

/// Logical channel a socket is opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEndpoint {
    Chat { room: String },
    Notifications,
    Maintenance { request_id: String },
}

impl ChannelEndpoint {
    /// Path below the websocket base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Chat { room } => format!("/ws/chat/{room}/"),
            Self::Notifications => "/ws/notifications/".to_string(),
            Self::Maintenance { request_id } => format!("/ws/maintenance/{request_id}/"),
        }
    }
}

/// Raw JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// Subscriber categories for inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Chat,
    Notification,
    Presence,
    EntityUpdate,
    Message,
}

impl_wire_names!(MessageKind {
    Chat => "chat_message",
    Notification => "notification",
    Presence => "presence",
    EntityUpdate => "entity_update",
    Message => "message",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub user: String,
    pub status: String,
}

/// Change notification for a backend entity (lease, maintenance request, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub entity: String,
    pub id: Value,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub changes: Value,
}

fn default_action() -> String {
    "updated".to_string()
}

/// Why an inbound frame was dropped.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Chat(ChatMessage),
    Notification(NotificationPayload),
    Presence(PresenceUpdate),
    EntityUpdate(EntityUpdate),
    /// Generic message; the envelope is passed through untouched.
    Message(Envelope),
    /// Heartbeat reply; consumed silently.
    Pong,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, FrameError> {
        if envelope.kind == "pong" {
            return Ok(Self::Pong);
        }

        let kind: MessageKind = envelope
            .kind
            .parse()
            .map_err(|_| FrameError::UnknownType(envelope.kind.clone()))?;

        match kind {
            MessageKind::Chat => {
                let mut chat: ChatMessage = decode(&envelope)?;
                if chat.sender.is_none() {
                    chat.sender = envelope.sender.clone();
                }
                if chat.timestamp.is_none() {
                    chat.timestamp = envelope.timestamp;
                }
                Ok(Self::Chat(chat))
            }
            MessageKind::Notification => Ok(Self::Notification(decode(&envelope)?)),
            MessageKind::Presence => Ok(Self::Presence(decode(&envelope)?)),
            MessageKind::EntityUpdate => Ok(Self::EntityUpdate(decode(&envelope)?)),
            MessageKind::Message => Ok(Self::Message(envelope)),
        }
    }

    /// Subscriber category, `None` for heartbeat replies.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::Chat(_) => Some(MessageKind::Chat),
            Self::Notification(_) => Some(MessageKind::Notification),
            Self::Presence(_) => Some(MessageKind::Presence),
            Self::EntityUpdate(_) => Some(MessageKind::EntityUpdate),
            Self::Message(_) => Some(MessageKind::Message),
            Self::Pong => None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, FrameError> {
    serde_json::from_value(envelope.data.clone())
        .map_err(|e| FrameError::Malformed(format!("{}: {}", envelope.kind, e)))
}

/// Outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data, timestamp: Utc::now() }
    }

    pub fn ping() -> Self {
        Self::new("ping", Value::Null)
    }

    pub fn chat(message: impl Into<String>) -> Self {
        Self::new("chat_message", serde_json::json!({ "message": message.into() }))
    }

    pub fn to_text(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_chat_fills_sender_from_envelope() {
        let text = r#"{
            "type": "chat_message",
            "data": {"message": "Is the unit available?"},
            "sender": "tenant-9"
        }"#;
        match InboundMessage::parse(text).unwrap() {
            InboundMessage::Chat(chat) => {
                assert_eq!(chat.message, "Is the unit available?");
                assert_eq!(chat.sender.as_deref(), Some("tenant-9"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_entity_update_defaults_action() {
        let text = r#"{"type":"entity_update","data":{"entity":"maintenance","id":12}}"#;
        let message = InboundMessage::parse(text).unwrap();
        assert_eq!(
            message,
            InboundMessage::EntityUpdate(EntityUpdate {
                entity: "maintenance".into(),
                id: json!(12),
                action: "updated".into(),
                changes: Value::Null,
            })
        );
    }

    #[test]
    fn test_pong_and_generic() {
        assert_eq!(InboundMessage::parse(r#"{"type":"pong"}"#).unwrap(), InboundMessage::Pong);
        let generic = InboundMessage::parse(r#"{"type":"message","data":{"x":1}}"#).unwrap();
        assert_eq!(generic.kind(), Some(MessageKind::Message));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"weather","data":{}}"#),
            Err(FrameError::UnknownType("weather".into()))
        );
        assert!(matches!(InboundMessage::parse("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"presence","data":{"user":"a"}}"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_outbound_ping_omits_data() {
        let text = OutboundMessage::ping().to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value.get("data").is_none());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(ChannelEndpoint::Chat { room: "42".into() }.path(), "/ws/chat/42/");
        assert_eq!(ChannelEndpoint::Notifications.path(), "/ws/notifications/");
        assert_eq!(
            ChannelEndpoint::Maintenance { request_id: "7".into() }.path(),
            "/ws/maintenance/7/"
        );
    }
}
