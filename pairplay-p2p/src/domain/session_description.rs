use super::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a WebRTC session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
            SdpKind::Pranswer => write!(f, "pranswer"),
        }
    }
}

/// `{ "type": ..., "sdp": ... }`, the payload that travels inside a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.kind == SdpKind::Offer
    }

    pub fn is_answer(&self) -> bool {
        self.kind == SdpKind::Answer
    }

    /// Reject a description whose kind does not fit the handshake step.
    pub fn expect_kind(self, expected: SdpKind) -> Result<Self, CodecError> {
        if self.kind == expected {
            Ok(self)
        } else {
            Err(CodecError::UnexpectedKind {
                expected,
                found: self.kind,
            })
        }
    }
}
