use super::{LocalCode, Role};
use serde::Serialize;
use std::fmt;

/// Summary of the handshake state machine. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Creating,
    Waiting,
    Connecting,
    Connected,
    Failed,
}

/// Triggers that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CreateRoom,
    OfferReady,
    JoinRoom,
    AnswerReady,
    CompleteConnection,
    ChannelOpened,
    Fail,
    Reset,
}

impl ConnectionStatus {
    /// Where `transition` leads from this status, or `None` if the table has
    /// no such edge.
    pub fn next(self, transition: Transition) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;
        use Transition::*;

        match (self, transition) {
            (Idle, CreateRoom) => Some(Creating),
            (Creating, OfferReady) => Some(Waiting),
            (Idle, JoinRoom) => Some(Connecting),
            (Connecting, AnswerReady) => Some(Waiting),
            (Waiting, CompleteConnection) => Some(Connecting),
            // The guest is still waiting when the host's side opens the channel
            (Waiting | Connecting, ChannelOpened) => Some(Connected),
            (_, Fail) => Some(Failed),
            (_, Reset) => Some(Idle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Creating => "creating",
            ConnectionStatus::Waiting => "waiting",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
}

/// User-facing failure classes. Each carries exactly one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeFailure {
    #[error("room creation failed")]
    RoomCreationFailed,

    #[error("invalid room code")]
    InvalidRoomCode,

    #[error("connection failed")]
    ConnectionFailed,

    #[error("no active connection")]
    NoActiveConnection,

    #[error("failed to complete connection")]
    CompletionFailed,

    #[error("connection lost")]
    ConnectionLost,
}

/// Observable snapshot of a connection engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub role: Option<Role>,
    pub local_code: LocalCode,
    pub error: Option<HandshakeFailure>,
}

impl ConnectionState {
    /// The error slot as the message shown to the user.
    pub fn error_message(&self) -> Option<String> {
        self.error.map(|failure| failure.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// `connected` implies a role; `idle` implies no role and no code.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ConnectionStatus::Connected => self.role.is_some(),
            ConnectionStatus::Idle => self.role.is_none() && self.local_code.is_empty(),
            _ => true,
        }
    }
}
