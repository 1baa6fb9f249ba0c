// Domain layer (core)
pub mod domain;

// Application layer (use cases)
pub mod application;

// Infrastructure layer (adapters)
pub mod infrastructure;

// Re-exports for convenience
pub use application::{
    ChannelWriter, ConnectionEngine, EngineConfig, MessageHandler, MultiplayerSync,
    PING_TIMEOUT,
};
pub use domain::{
    is_my_turn, CodecError, ConnectionState, ConnectionStatus, HandshakeFailure, IceServer,
    LocalCode, Role, SdpKind, SessionDescription, StatusChange, Transition,
};
pub use infrastructure::error::{P2PError, Result};
pub use infrastructure::{
    GameMessage, LinkState, LoopbackConnector, LoopbackNetwork, MessageKind, PeerConnector,
    PeerLink, TransportEvent,
};

#[cfg(feature = "native")]
pub use infrastructure::{WebRtcConnector, WebRtcLink};

/// Connection engine over native WebRTC
#[cfg(feature = "native")]
pub type WebRtcEngine = ConnectionEngine<WebRtcConnector>;

/// Sync layer over native WebRTC
#[cfg(feature = "native")]
pub type WebRtcSync = MultiplayerSync<WebRtcConnector>;
