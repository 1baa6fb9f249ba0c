#![allow(dead_code)]

use pairplay_p2p::{
    ConnectionEngine, ConnectionState, ConnectionStatus, EngineConfig, LoopbackConnector,
    LoopbackNetwork, MultiplayerSync,
};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub type LoopbackEngine = ConnectionEngine<LoopbackConnector>;
pub type LoopbackSync = MultiplayerSync<LoopbackConnector>;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// Wait (bounded) until `engine` reaches `status`.
pub async fn settle<C: pairplay_p2p::PeerConnector>(
    engine: &ConnectionEngine<C>,
    status: ConnectionStatus,
) -> ConnectionState {
    tokio::time::timeout(SETTLE_TIMEOUT, engine.wait_for(|s| s.status == status))
        .await
        .unwrap_or_else(|_| panic!("never reached {status}, stuck at {}", engine.status()))
}

/// Let spawned event pumps drain.
pub async fn drain() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Host + guest engines sharing one in-process network
pub struct EnginePair {
    pub network: LoopbackNetwork,
    pub host: LoopbackEngine,
    pub guest: LoopbackEngine,
}

impl EnginePair {
    pub fn new() -> Self {
        let network = LoopbackNetwork::new();
        Self {
            host: ConnectionEngine::new(network.connector(), EngineConfig::default()),
            guest: ConnectionEngine::new(network.connector(), EngineConfig::default()),
            network,
        }
    }

    /// Full two-code exchange; both sides end `connected`.
    pub async fn connect(&self) {
        self.host.create_room().await;
        self.guest.join_room(self.host.local_code().as_str()).await;
        self.host
            .complete_connection(self.guest.local_code().as_str())
            .await;
        settle(&self.host, ConnectionStatus::Connected).await;
        settle(&self.guest, ConnectionStatus::Connected).await;
    }
}

/// Host + guest sync layers sharing one in-process network
pub struct SyncPair {
    pub network: LoopbackNetwork,
    pub host: LoopbackSync,
    pub guest: LoopbackSync,
}

impl SyncPair {
    pub fn new() -> Self {
        let network = LoopbackNetwork::new();
        Self {
            host: MultiplayerSync::new(network.connector(), EngineConfig::default()),
            guest: MultiplayerSync::new(network.connector(), EngineConfig::default()),
            network,
        }
    }

    pub async fn connect(&self) {
        self.host.create_room().await;
        self.guest.join_room(self.host.local_code().as_str()).await;
        self.host
            .complete_connection(self.guest.local_code().as_str())
            .await;
        settle(self.host.engine(), ConnectionStatus::Connected).await;
        settle(self.guest.engine(), ConnectionStatus::Connected).await;
    }
}
