//! Typed message bus over a [`ConnectionEngine`].
//!
//! Game modules exchange full-state snapshots, discrete actions and resets.
//! Ping/pong keep-alive is answered here and never reaches them.

use crate::application::config::EngineConfig;
use crate::application::engine::{ChannelWriter, ConnectionEngine};
use crate::domain::{self, ConnectionState, ConnectionStatus, LocalCode, Role};
use crate::infrastructure::message::{GameMessage, MessageKind};
use crate::infrastructure::transport::{PeerConnector, PeerLink};
use instant::{Duration, Instant};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

type PayloadHandler = dyn Fn(serde_json::Value) + Send + Sync;
type ResetHandler = dyn Fn() + Send + Sync;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-assignment handler slot; registering replaces the previous handler.
struct HandlerSlot<H: ?Sized>(Mutex<Option<Arc<H>>>);

impl<H: ?Sized> Default for HandlerSlot<H> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<H: ?Sized> HandlerSlot<H> {
    fn set(&self, handler: Arc<H>) {
        *lock(&self.0) = Some(handler);
    }

    fn get(&self) -> Option<Arc<H>> {
        lock(&self.0).clone()
    }
}

/// An unanswered ping older than this no longer blocks a new one.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Keepalive {
    pending_since: Option<Instant>,
    last_round_trip: Option<Duration>,
}

impl Keepalive {
    /// Stamp a new ping unless one is still awaiting its pong.
    fn start(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(sent) if now.saturating_duration_since(sent) < PING_TIMEOUT => false,
            _ => {
                self.pending_since = Some(now);
                true
            }
        }
    }
}

#[derive(Default)]
struct Handlers {
    state: HandlerSlot<PayloadHandler>,
    action: HandlerSlot<PayloadHandler>,
    reset: HandlerSlot<ResetHandler>,
    keepalive: Mutex<Keepalive>,
}

impl Handlers {
    fn route<P: PeerLink>(&self, writer: &ChannelWriter<P>, raw: serde_json::Value) {
        let message: GameMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Dropping unrecognised message: {}", e);
                return;
            }
        };

        match message.kind {
            MessageKind::Ping => {
                tracing::trace!("Ping received, answering");
                writer.send(&GameMessage::pong());
            }
            MessageKind::Pong => {
                let mut keepalive = lock(&self.keepalive);
                if let Some(sent) = keepalive.pending_since.take() {
                    let rtt = sent.elapsed();
                    tracing::debug!("Round trip {:?}", rtt);
                    keepalive.last_round_trip = Some(rtt);
                }
            }
            MessageKind::State => match self.state.get() {
                Some(handler) => handler(message.into_payload()),
                None => tracing::debug!("No state handler, dropping snapshot"),
            },
            MessageKind::Action => match self.action.get() {
                Some(handler) => handler(message.into_payload()),
                None => tracing::debug!("No action handler, dropping action"),
            },
            MessageKind::Reset => match self.reset.get() {
                Some(handler) => handler(),
                None => tracing::debug!("No reset handler, dropping reset"),
            },
        }
    }
}

/// The only surface game modules use: connection state, handshake
/// operations and typed messaging.
pub struct MultiplayerSync<C: PeerConnector> {
    engine: ConnectionEngine<C>,
    handlers: Arc<Handlers>,
}

impl<C: PeerConnector> MultiplayerSync<C> {
    pub fn new(connector: C, config: EngineConfig) -> Self {
        Self::from_engine(ConnectionEngine::new(connector, config))
    }

    /// Take over an engine. Its message handler is replaced.
    pub fn from_engine(engine: ConnectionEngine<C>) -> Self {
        let handlers = Arc::new(Handlers::default());
        let writer = engine.writer();
        let routes = handlers.clone();
        engine.on_message(move |raw| routes.route(&writer, raw));

        Self { engine, handlers }
    }

    pub fn engine(&self) -> &ConnectionEngine<C> {
        &self.engine
    }

    pub fn state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.engine.status()
    }

    pub fn role(&self) -> Option<Role> {
        self.engine.role()
    }

    pub fn local_code(&self) -> LocalCode {
        self.engine.local_code()
    }

    pub fn error_message(&self) -> Option<String> {
        self.engine.error_message()
    }

    pub async fn create_room(&self) {
        self.engine.create_room().await
    }

    pub async fn join_room(&self, code: &str) {
        self.engine.join_room(code).await
    }

    pub async fn complete_connection(&self, code: &str) {
        self.engine.complete_connection(code).await
    }

    pub fn disconnect(&self) {
        self.engine.disconnect()
    }

    fn publish(&self, kind: MessageKind, payload: Option<serde_json::Value>) {
        self.engine.send(&GameMessage::new(kind, payload));
    }

    fn publish_payload<T: Serialize + ?Sized>(&self, kind: MessageKind, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.publish(kind, Some(value)),
            Err(e) => tracing::warn!("Failed to serialize {:?} payload: {}", kind, e),
        }
    }

    /// Send a full game-state snapshot.
    pub fn send_game_state<T: Serialize + ?Sized>(&self, state: &T) {
        self.publish_payload(MessageKind::State, state);
    }

    /// Send one player action.
    pub fn send_action<T: Serialize + ?Sized>(&self, action: &T) {
        self.publish_payload(MessageKind::Action, action);
    }

    pub fn send_reset(&self) {
        self.publish(MessageKind::Reset, None);
    }

    /// Ping the peer; the pong updates [`MultiplayerSync::last_round_trip`].
    ///
    /// At most one ping is outstanding. Calls made while an earlier ping is
    /// unanswered and younger than [`PING_TIMEOUT`] send nothing.
    pub fn send_ping(&self) {
        if !self.engine.is_connected() {
            return;
        }
        if !lock(&self.handlers.keepalive).start(Instant::now()) {
            tracing::trace!("Ping already in flight");
            return;
        }
        self.publish(MessageKind::Ping, None);
    }

    pub fn last_round_trip(&self) -> Option<Duration> {
        lock(&self.handlers.keepalive).last_round_trip
    }

    pub fn on_game_state<F>(&self, handler: F)
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.handlers.state.set(Arc::new(handler));
    }

    pub fn on_action<F>(&self, handler: F)
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.handlers.action.set(Arc::new(handler));
    }

    pub fn on_reset<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.reset.set(Arc::new(handler));
    }

    /// True iff `current` is the turn value owned by this side.
    pub fn is_my_turn<T: PartialEq + ?Sized>(
        &self,
        current: &T,
        host_value: &T,
        guest_value: &T,
    ) -> bool {
        domain::is_my_turn(self.role(), current, host_value, guest_value)
    }
}

impl<C: PeerConnector> fmt::Debug for MultiplayerSync<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplayerSync")
            .field("engine", &self.engine)
            .field("last_round_trip", &self.last_round_trip())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::loopback::{LoopbackConnector, LoopbackNetwork};

    fn sync(network: &LoopbackNetwork) -> MultiplayerSync<LoopbackConnector> {
        MultiplayerSync::new(network.connector(), EngineConfig::default())
    }

    #[test]
    fn test_handler_slot_replaces() {
        let slot: HandlerSlot<dyn Fn() -> u8 + Send + Sync> = HandlerSlot::default();
        assert!(slot.get().is_none());

        slot.set(Arc::new(|| 1));
        slot.set(Arc::new(|| 2));

        assert_eq!(slot.get().map(|handler| handler()), Some(2));
    }

    #[test]
    fn test_keepalive_one_ping_in_flight() {
        let mut keepalive = Keepalive::default();
        let sent = Instant::now();

        assert!(keepalive.start(sent));
        assert!(!keepalive.start(sent + Duration::from_millis(500)));
        assert_eq!(keepalive.pending_since, Some(sent));

        // Lost pong: the stale ping is replaced
        let later = sent + PING_TIMEOUT;
        assert!(keepalive.start(later));
        assert_eq!(keepalive.pending_since, Some(later));
    }

    #[test]
    fn test_keepalive_restarts_after_pong() {
        let mut keepalive = Keepalive::default();
        let sent = Instant::now();
        assert!(keepalive.start(sent));

        keepalive.pending_since.take();
        assert!(keepalive.start(sent + Duration::from_millis(1)));
    }

    #[tokio::test]
    async fn test_turn_requires_role() {
        let network = LoopbackNetwork::new();
        let host = sync(&network);

        assert!(!host.is_my_turn("red", "red", "yellow"));

        host.create_room().await;
        assert!(host.is_my_turn("red", "red", "yellow"));
        assert!(!host.is_my_turn("yellow", "red", "yellow"));
    }

    #[tokio::test]
    async fn test_sends_before_connect_write_nothing() {
        let network = LoopbackNetwork::new();
        let host = sync(&network);
        host.create_room().await;

        host.send_game_state(&serde_json::json!({ "board": [] }));
        host.send_action(&serde_json::json!({ "col": 0 }));
        host.send_reset();
        host.send_ping();

        assert_eq!(network.writes(), 0);
        assert!(host.last_round_trip().is_none());
    }
}
