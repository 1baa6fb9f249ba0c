mod config;
mod engine;
mod multiplayer_sync;

pub use config::{EngineConfig, DEFAULT_CHANNEL_LABEL, DEFAULT_ICE_GATHERING_TIMEOUT};
pub use engine::{ChannelWriter, ConnectionEngine, MessageHandler};
pub use multiplayer_sync::{MultiplayerSync, PING_TIMEOUT};
