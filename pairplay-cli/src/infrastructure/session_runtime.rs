use crate::application::ConsoleCommand;
use crate::infrastructure::error::{CliError, Result};
use pairplay_p2p::{ConnectionStatus, MultiplayerSync, PeerConnector, Role};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How often the round-trip figure is refreshed without any other trigger
const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(250);

/// Game traffic received from the peer
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    State(Value),
    Action(Value),
    Reset,
}

/// Snapshot of session state (read-only, cheap to clone)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub role: Option<Role>,
    pub error: Option<String>,
    pub round_trip: Option<Duration>,
}

impl SessionSnapshot {
    fn capture<C: PeerConnector>(sync: &MultiplayerSync<C>) -> Self {
        let state = sync.state();
        Self {
            status: state.status,
            role: state.role,
            error: state.error_message(),
            round_trip: sync.last_round_trip(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Background runtime driving a connected [`MultiplayerSync`] for the console
pub struct SessionRuntime<C: PeerConnector> {
    /// Send commands to the sync layer
    cmd_tx: mpsc::Sender<ConsoleCommand>,

    /// Receive state snapshots (latest always available)
    state_rx: watch::Receiver<SessionSnapshot>,

    /// Handle to background task
    task_handle: tokio::task::JoinHandle<()>,

    sync: Arc<MultiplayerSync<C>>,
}

impl<C: PeerConnector> SessionRuntime<C> {
    /// Take over `sync`. Inbound game traffic is forwarded to the returned receiver.
    pub fn spawn(sync: MultiplayerSync<C>) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let state_tx = inbound_tx.clone();
        sync.on_game_state(move |state| {
            let _ = state_tx.send(Inbound::State(state));
        });
        let action_tx = inbound_tx.clone();
        sync.on_action(move |action| {
            let _ = action_tx.send(Inbound::Action(action));
        });
        sync.on_reset(move || {
            let _ = inbound_tx.send(Inbound::Reset);
        });

        let sync = Arc::new(sync);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ConsoleCommand>(100);
        let (snapshot_tx, state_rx) = watch::channel(SessionSnapshot::capture(&sync));
        let mut engine_rx = sync.engine().subscribe();

        let task_sync = sync.clone();
        let task_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!("Session runtime started");

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(cmd) => execute(&task_sync, cmd),
                        None => break,
                    },
                    changed = engine_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {}
                }

                let next = SessionSnapshot::capture(&task_sync);
                snapshot_tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }

            tracing::info!("Session runtime stopped");
        });

        let runtime = Self {
            cmd_tx,
            state_rx,
            task_handle,
            sync,
        };
        (runtime, inbound_rx)
    }

    /// Submit a command (queued behind earlier ones)
    pub async fn submit_command(&self, cmd: ConsoleCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| CliError::RuntimeStopped)
    }

    /// Get latest state snapshot (always succeeds, never blocks)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    /// Stop the runtime and close the connection
    pub async fn shutdown(self) {
        self.task_handle.abort();
        let _ = self.task_handle.await;
        self.sync.disconnect();
    }
}

fn execute<C: PeerConnector>(sync: &MultiplayerSync<C>, cmd: ConsoleCommand) {
    tracing::debug!("Executing {:?}", cmd);
    match cmd {
        ConsoleCommand::State(state) => sync.send_game_state(&state),
        ConsoleCommand::Action(action) => sync.send_action(&action),
        ConsoleCommand::Reset => sync.send_reset(),
        ConsoleCommand::Ping => sync.send_ping(),
        // Local to the console
        ConsoleCommand::Status | ConsoleCommand::Help | ConsoleCommand::Quit => {}
    }
}
