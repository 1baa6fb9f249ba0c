use serde::{Deserialize, Serialize};

/// Envelope exchanged on the data channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMessage {
    /// Message type discriminator
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Game-defined value, opaque to the sync layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Send time in Unix milliseconds
    #[serde(default)]
    pub timestamp: u64,
}

/// Message types (game traffic + keep-alive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Full game-state snapshot
    State,
    /// Discrete player action
    Action,
    /// Start a new round
    Reset,
    Ping,
    Pong,
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

impl GameMessage {
    /// Envelope stamped with the current time
    pub fn new(kind: MessageKind, payload: Option<serde_json::Value>) -> Self {
        Self {
            kind,
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn pong() -> Self {
        Self::new(MessageKind::Pong, None)
    }

    /// Payload handed to game handlers; `Null` when absent.
    pub fn into_payload(self) -> serde_json::Value {
        self.payload.unwrap_or(serde_json::Value::Null)
    }
}
