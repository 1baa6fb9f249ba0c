pub mod error;
pub mod loopback;
pub mod message;
pub mod transport;
#[cfg(feature = "native")]
pub mod webrtc_transport;

pub use loopback::{LoopbackConnector, LoopbackFaults, LoopbackLink, LoopbackNetwork};
pub use message::{GameMessage, MessageKind};
pub use transport::{
    LinkState, PeerConnector, PeerLink, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
#[cfg(feature = "native")]
pub use webrtc_transport::{WebRtcConnector, WebRtcLink};
