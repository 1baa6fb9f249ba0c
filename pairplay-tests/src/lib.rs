use cucumber::World;
use pairplay_p2p::{
    ConnectionStatus, EngineConfig, LoopbackConnector, LoopbackNetwork, MultiplayerSync,
};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type LoopbackSync = MultiplayerSync<LoopbackConnector>;

/// Upper bound for anything that crosses the in-process network
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    Guest,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Side::Host),
            "guest" => Ok(Side::Guest),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

/// One game message as seen by a handler
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub side: Side,
    pub kind: &'static str,
    pub payload: Value,
}

#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct RoomWorld {
    /// In-process network both sides share
    pub network: LoopbackNetwork,

    pub host: LoopbackSync,
    pub guest: LoopbackSync,

    /// Everything the recording handlers saw, in arrival order
    pub deliveries: Arc<Mutex<Vec<Delivery>>>,

    /// Turn values owned by (host, guest)
    pub turn_values: Option<(String, String)>,
}

impl RoomWorld {
    pub fn new() -> Self {
        let network = LoopbackNetwork::new();
        Self {
            host: MultiplayerSync::new(network.connector(), EngineConfig::default()),
            guest: MultiplayerSync::new(network.connector(), EngineConfig::default()),
            network,
            deliveries: Arc::default(),
            turn_values: None,
        }
    }

    pub fn side(&self, side: Side) -> &LoopbackSync {
        match side {
            Side::Host => &self.host,
            Side::Guest => &self.guest,
        }
    }

    /// Full two-code exchange; both sides end `connected`.
    pub async fn connect(&self) {
        self.host.create_room().await;
        self.guest.join_room(self.host.local_code().as_str()).await;
        self.host
            .complete_connection(self.guest.local_code().as_str())
            .await;
        self.settle(Side::Host, ConnectionStatus::Connected).await;
        self.settle(Side::Guest, ConnectionStatus::Connected).await;
    }

    /// Wait (bounded) until `side` reaches `status`; returns where it ended up.
    pub async fn settle(&self, side: Side, status: ConnectionStatus) -> ConnectionStatus {
        let engine = self.side(side).engine();
        let _ = tokio::time::timeout(SETTLE_TIMEOUT, engine.wait_for(|s| s.status == status)).await;
        engine.status()
    }

    /// Register recording handlers on both sides.
    pub fn record_traffic(&self) {
        for side in [Side::Host, Side::Guest] {
            let sync = self.side(side);

            let log = self.deliveries.clone();
            sync.on_game_state(move |payload| record(&log, side, "state", payload));
            let log = self.deliveries.clone();
            sync.on_action(move |payload| record(&log, side, "action", payload));
            let log = self.deliveries.clone();
            sync.on_reset(move || record(&log, side, "reset", Value::Null));
        }
    }

    pub fn received_by(&self, side: Side) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|log| log.iter().filter(|d| d.side == side).cloned().collect())
            .unwrap_or_default()
    }

    /// Wait (bounded) until `side` has received at least `count` messages.
    pub async fn wait_for_deliveries(&self, side: Side, count: usize) -> Vec<Delivery> {
        let _ = tokio::time::timeout(SETTLE_TIMEOUT, async {
            while self.received_by(side).len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        self.received_by(side)
    }
}

impl Default for RoomWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn record(log: &Mutex<Vec<Delivery>>, side: Side, kind: &'static str, payload: Value) {
    if let Ok(mut log) = log.lock() {
        log.push(Delivery {
            side,
            kind,
            payload,
        });
    }
}
