//! Wire frames exchanged with the chat server.
//!
//! Every frame is a JSON text message tagged by a `"type"` field, e.g.
//! `{"type":"join","username":"ab"}`. Inbound frames accept the field spellings
//! the server has used over time (`message` for the text body, `user_count`
//! for the count).

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A chat line authored by a participant. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    #[serde(alias = "message")]
    pub text: String,
    /// RFC 3339 timestamp assigned by the sender.
    #[serde(default)]
    pub timestamp: String,
}

impl ChatMessage {
    /// Create a message stamped with the current UTC time.
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// First character of the author name, uppercased.
    pub fn avatar_initial(&self) -> String {
        self.username
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    }

    /// Local wall-clock `HH:MM` of the timestamp.
    pub fn time_label(&self) -> String {
        format_time(&self.timestamp)
    }
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Join { username: String },
    Message(ChatMessage),
    Leave { username: String },
}

/// Frames the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(ChatMessage),
    UserJoined {
        username: String,
        #[serde(default, alias = "user_count")]
        count: Option<u32>,
    },
    UserLeft {
        username: String,
        #[serde(default, alias = "user_count")]
        count: Option<u32>,
    },
    UserCount {
        count: u32,
    },
    Error {
        #[serde(default, alias = "message")]
        detail: String,
    },
}

pub fn encode_outbound(event: &OutboundEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub fn decode_inbound(text: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// Format an RFC 3339 timestamp as local `HH:MM`; `--:--` when unparseable.
pub fn format_time(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.with_timezone(&Local).format("%H:%M").to_string(),
        Err(_) => "--:--".to_string(),
    }
}
