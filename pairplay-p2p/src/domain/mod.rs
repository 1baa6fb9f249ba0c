mod ice_server;
mod local_code;
mod role;
mod session_description;
mod status;

pub use ice_server::{IceServer, DEFAULT_STUN_URL};
pub use local_code::{CodecError, LocalCode};
pub use role::{is_my_turn, Role};
pub use session_description::{SdpKind, SessionDescription};
pub use status::{ConnectionState, ConnectionStatus, HandshakeFailure, StatusChange, Transition};
