#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid room code: {0}")]
    InvalidCode(#[from] pairplay_p2p::CodecError),

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Session runtime stopped")]
    RuntimeStopped,

    #[error("Interrupted")]
    Interrupted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl CliError {
    pub fn handshake(message: Option<String>) -> Self {
        CliError::Handshake(message.unwrap_or_else(|| "unknown error".to_string()))
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
