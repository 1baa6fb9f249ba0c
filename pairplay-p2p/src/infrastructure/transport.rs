use crate::domain::{IceServer, SessionDescription};
use crate::infrastructure::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Peer-connection level state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// The link can no longer carry traffic without a new handshake.
    pub fn is_lost(&self) -> bool {
        matches!(self, LinkState::Failed | LinkState::Disconnected)
    }
}

/// Asynchronous notifications pushed by a [`PeerLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Data channel is ready for traffic
    ChannelOpen,

    /// Data channel closed (typically the remote tore down)
    ChannelClosed,

    /// Inbound text frame
    Message(String),

    /// Connection-state change
    LinkState(LinkState),
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Allocates peer connections (allows swapping the real stack for an in-process one)
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    type Peer: PeerLink;

    /// Create one peer connection. Every notification it produces goes to `events`.
    async fn open(
        &self,
        ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<Self::Peer>;
}

/// One peer connection plus its single data channel
#[async_trait]
pub trait PeerLink: Send + Sync + 'static {
    /// Create the ordered, reliable data channel (offer side only).
    async fn create_channel(&self, label: &str) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Fails with [`crate::P2PError::RejectedDescription`] when the description
    /// itself is unacceptable.
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Resolves once candidate gathering has completed. May never resolve.
    async fn ice_gathering_complete(&self);

    /// Current local description, including candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    fn is_channel_open(&self) -> bool;

    /// Queue one text frame. Never blocks; frames leave in call order.
    fn send_text(&self, text: String) -> Result<()>;

    /// Release the connection. Idempotent.
    fn close(&self);
}
