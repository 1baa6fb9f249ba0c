use serde::{Deserialize, Serialize};

/// Public STUN helper used when nothing else is configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// ICE server configuration for WebRTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (can have multiple for failover)
    pub urls: Vec<String>,
    /// Username for authentication (optional, required for TURN)
    pub username: Option<String>,
    /// Credential for authentication (optional, required for TURN)
    pub credential: Option<String>,
}

impl IceServer {
    /// Create a STUN server configuration
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server configuration with authentication
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// Local networks usually connect on host candidates alone; the single
    /// reflection helper is only a fallback.
    pub fn default_servers() -> Vec<Self> {
        vec![Self::stun(DEFAULT_STUN_URL)]
    }

    pub fn has_auth(&self) -> bool {
        self.username.is_some() && self.credential.is_some()
    }
}
