use crate::domain::IceServer;
use instant::Duration;

/// Default label of the single data channel
pub const DEFAULT_CHANNEL_LABEL: &str = "game";

/// Default upper bound on waiting for ICE candidate gathering
pub const DEFAULT_ICE_GATHERING_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a connection engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ICE servers handed to every peer connection
    pub ice_servers: Vec<IceServer>,

    /// How long a handshake step waits for gathering before emitting the code as-is
    pub ice_gathering_timeout: Duration,

    /// Data channel label
    pub channel_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: IceServer::default_servers(),
            ice_gathering_timeout: DEFAULT_ICE_GATHERING_TIMEOUT,
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ICE server list
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Add a TURN relay on top of the configured servers
    pub fn with_turn_server(
        mut self,
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.ice_servers
            .push(IceServer::turn(url, username, credential));
        self
    }

    pub fn with_ice_gathering_timeout(mut self, timeout: Duration) -> Self {
        self.ice_gathering_timeout = timeout;
        self
    }

    pub fn with_channel_label(mut self, label: impl Into<String>) -> Self {
        self.channel_label = label.into();
        self
    }
}
