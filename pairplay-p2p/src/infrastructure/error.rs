use crate::domain::CodecError;

/// Infrastructure layer errors
#[derive(Debug, thiserror::Error)]
pub enum P2PError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote description rejected: {0}")]
    RejectedDescription(String),

    #[error("Code error: {0}")]
    Codec(#[from] CodecError),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Handshake superseded by a newer one")]
    Superseded,
}

pub type Result<T> = std::result::Result<T, P2PError>;
