//! Manual-signaling handshake state machine.
//!
//! One engine owns at most one peer connection and one data channel. The
//! public handshake operations never return errors: every outcome lands in the
//! observable [`ConnectionState`].

use crate::application::config::EngineConfig;
use crate::domain::{
    ConnectionState, ConnectionStatus, HandshakeFailure, LocalCode, Role, SdpKind,
    SessionDescription, StatusChange, Transition,
};
use crate::infrastructure::error::{P2PError, Result};
use crate::infrastructure::transport::{
    PeerConnector, PeerLink, TransportEvent, TransportEventReceiver,
};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

const TRANSITION_BACKLOG: usize = 64;

/// Receives every parsed inbound message
pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Slot<P> {
    /// Bumped whenever the current attempt is abandoned
    generation: u64,
    peer: Option<Arc<P>>,
    pump: Option<JoinHandle<()>>,
}

impl<P> Slot<P> {
    fn abandon(&mut self) -> (Option<Arc<P>>, Option<JoinHandle<()>>) {
        self.generation += 1;
        (self.peer.take(), self.pump.take())
    }
}

struct Shared<P> {
    slot: Mutex<Slot<P>>,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StatusChange>,
    handler: Mutex<Option<MessageHandler>>,
}

fn release<P: PeerLink>(peer: Option<Arc<P>>, pump: Option<JoinHandle<()>>) {
    if let Some(pump) = pump {
        pump.abort();
    }
    if let Some(peer) = peer {
        peer.close();
    }
}

fn clear_session(state: &mut ConnectionState) {
    state.role = None;
    state.local_code = LocalCode::default();
    state.error = None;
}

impl<P: PeerLink> Shared<P> {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        let (transitions, _) = broadcast::channel(TRANSITION_BACKLOG);
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                peer: None,
                pump: None,
            }),
            state,
            transitions,
            handler: Mutex::new(None),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.slot).generation == generation
    }

    /// Apply `transition` if the table allows it. Caller holds the slot lock.
    fn apply(&self, transition: Transition, update: impl FnOnce(&mut ConnectionState)) -> bool {
        let mut accepted = false;
        let mut change = None;

        self.state.send_if_modified(|state| {
            let Some(next) = state.status.next(transition) else {
                tracing::warn!("Ignoring {:?} while {}", transition, state.status);
                return false;
            };
            accepted = true;

            let before = state.clone();
            state.status = next;
            update(state);

            if before.status != next {
                change = Some(StatusChange {
                    from: before.status,
                    to: next,
                });
            }
            *state != before
        });

        if let Some(change) = change {
            tracing::debug!("Status {} -> {}", change.from, change.to);
            let _ = self.transitions.send(change);
        }
        accepted
    }

    /// Apply `transition` on behalf of `generation`; stale attempts are ignored.
    fn transition(
        &self,
        generation: u64,
        transition: Transition,
        update: impl FnOnce(&mut ConnectionState),
    ) -> bool {
        let slot = lock(&self.slot);
        if slot.generation != generation {
            tracing::debug!("Discarding {:?} from superseded attempt", transition);
            return false;
        }
        self.apply(transition, update)
    }

    /// Abandon whatever attempt is current and return to idle.
    fn reset(&self) -> u64 {
        let (peer, pump, generation) = {
            let mut slot = lock(&self.slot);
            let (peer, pump) = slot.abandon();
            self.apply(Transition::Reset, clear_session);
            (peer, pump, slot.generation)
        };
        release(peer, pump);
        generation
    }

    /// Remote hung up: same as [`Shared::reset`] but only for the live attempt.
    fn close_from_remote(&self, generation: u64) -> bool {
        let (peer, pump) = {
            let mut slot = lock(&self.slot);
            if slot.generation != generation {
                return false;
            }
            let released = slot.abandon();
            self.apply(Transition::Reset, clear_session);
            released
        };
        release(peer, pump);
        true
    }

    /// Tear the live attempt down and park in `failed`. Role stays for display.
    fn fail(&self, generation: u64, failure: HandshakeFailure) -> bool {
        let (peer, pump) = {
            let mut slot = lock(&self.slot);
            if slot.generation != generation {
                return false;
            }
            let released = slot.abandon();
            self.apply(Transition::Fail, |state| {
                state.local_code = LocalCode::default();
                state.error = Some(failure);
            });
            released
        };
        release(peer, pump);
        true
    }

    /// Drop everything without publishing state.
    fn shutdown(&self) {
        let (peer, pump) = lock(&self.slot).abandon();
        release(peer, pump);
    }

    fn install(&self, generation: u64, peer: Arc<P>, pump: JoinHandle<()>) -> Result<()> {
        {
            let mut slot = lock(&self.slot);
            if slot.generation == generation {
                slot.peer = Some(peer);
                slot.pump = Some(pump);
                return Ok(());
            }
        }
        release(Some(peer), Some(pump));
        Err(P2PError::Superseded)
    }

    fn peer(&self) -> (u64, Option<Arc<P>>) {
        let slot = lock(&self.slot);
        (slot.generation, slot.peer.clone())
    }

    fn send<T: Serialize + ?Sized>(&self, data: &T) {
        let Some(peer) = self.peer().1 else {
            tracing::debug!("No peer connection, dropping outbound message");
            return;
        };
        // The channel can open a moment before the pump reports it
        let status = self.state.borrow().status;
        if status != ConnectionStatus::Connected || !peer.is_channel_open() {
            tracing::debug!("Not connected ({}), dropping outbound message", status);
            return;
        }

        let text = match serde_json::to_string(data) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to serialize outbound message: {}", e);
                return;
            }
        };

        tracing::trace!("📤 {}", text);
        if let Err(e) = peer.send_text(text) {
            tracing::debug!("Outbound message dropped: {}", e);
        }
    }

    fn dispatch(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Discarding malformed inbound frame: {}", e);
                return;
            }
        };

        // Clone out so the handler may re-register or send without deadlocking
        let handler = lock(&self.handler).clone();
        match handler {
            Some(handler) => handler(value),
            None => tracing::debug!("No message handler registered, dropping inbound frame"),
        }
    }
}

async fn pump_events<P: PeerLink>(
    shared: Weak<Shared<P>>,
    generation: u64,
    mut events: TransportEventReceiver,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        match event {
            TransportEvent::ChannelOpen => {
                if shared.transition(generation, Transition::ChannelOpened, |state| {
                    state.error = None;
                }) {
                    tracing::info!("🟢 Data channel open, connected");
                }
            }
            TransportEvent::ChannelClosed => {
                if shared.close_from_remote(generation) {
                    tracing::info!("🔴 Data channel closed, back to idle");
                }
            }
            TransportEvent::LinkState(state) if state.is_lost() => {
                if shared.fail(generation, HandshakeFailure::ConnectionLost) {
                    tracing::warn!("Connection lost (link {:?})", state);
                }
            }
            TransportEvent::LinkState(state) => {
                tracing::debug!("Link state {:?}", state);
            }
            TransportEvent::Message(text) => {
                if shared.is_current(generation) {
                    tracing::trace!("📥 {}", text);
                    shared.dispatch(&text);
                }
            }
        }
    }
}

/// Send-only handle that does not keep the engine alive
pub struct ChannelWriter<P> {
    shared: Weak<Shared<P>>,
}

impl<P> Clone for ChannelWriter<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: PeerLink> ChannelWriter<P> {
    /// Same contract as [`ConnectionEngine::send`]
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(shared) = self.shared.upgrade() {
            shared.send(data);
        }
    }
}

/// Turns the transport's multi-step negotiation into a two-code exchange
pub struct ConnectionEngine<C: PeerConnector> {
    connector: C,
    config: EngineConfig,
    shared: Arc<Shared<C::Peer>>,
}

impl<C: PeerConnector> ConnectionEngine<C> {
    pub fn new(connector: C, config: EngineConfig) -> Self {
        Self {
            connector,
            config,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn with_default_config(connector: C) -> Self {
        Self::new(connector, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Host side: produce the room code. Ends in `waiting` or `failed`.
    pub async fn create_room(&self) {
        let generation = self.shared.reset();

        async move {
            if !self
                .shared
                .transition(generation, Transition::CreateRoom, |_| {})
            {
                return;
            }

            match self.offer(generation).await {
                Ok(code) => {
                    let len = code.len();
                    if self
                        .shared
                        .transition(generation, Transition::OfferReady, |state| {
                            state.role = Some(Role::Host);
                            state.local_code = code;
                        })
                    {
                        tracing::info!("🏠 Room created, code is {} characters", len);
                    }
                }
                Err(e) => self.abort_attempt(generation, HandshakeFailure::RoomCreationFailed, e),
            }
        }
        .instrument(tracing::info_span!("create_room", generation))
        .await
    }

    /// Guest side: consume the room code and produce the answer code.
    pub async fn join_room(&self, code: &str) {
        let generation = self.shared.reset();

        async move {
            if !self
                .shared
                .transition(generation, Transition::JoinRoom, |_| {})
            {
                return;
            }

            let offer = match LocalCode::decode_kind(code, SdpKind::Offer) {
                Ok(offer) => offer,
                Err(e) => {
                    self.abort_attempt(generation, HandshakeFailure::InvalidRoomCode, e.into());
                    return;
                }
            };

            match self.answer(generation, offer).await {
                Ok(code) => {
                    let len = code.len();
                    if self
                        .shared
                        .transition(generation, Transition::AnswerReady, |state| {
                            state.role = Some(Role::Guest);
                            state.local_code = code;
                        })
                    {
                        tracing::info!("🎟️ Joined room, answer code is {} characters", len);
                    }
                }
                Err(e @ (P2PError::RejectedDescription(_) | P2PError::Codec(_))) => {
                    self.abort_attempt(generation, HandshakeFailure::InvalidRoomCode, e)
                }
                Err(e) => self.abort_attempt(generation, HandshakeFailure::ConnectionFailed, e),
            }
        }
        .instrument(tracing::info_span!("join_room", generation))
        .await
    }

    /// Host side: apply the guest's answer code. The channel-open event
    /// finishes the handshake asynchronously.
    pub async fn complete_connection(&self, code: &str) {
        let (generation, peer) = self.shared.peer();

        async move {
            let Some(peer) = peer else {
                tracing::warn!("completeConnection without a peer connection");
                self.shared.fail(generation, HandshakeFailure::NoActiveConnection);
                return;
            };

            if self.role() != Some(Role::Host) {
                tracing::warn!("completeConnection ignored: only the host applies an answer");
                return;
            }

            if !self
                .shared
                .transition(generation, Transition::CompleteConnection, |state| {
                    state.error = None;
                })
            {
                return;
            }

            let answer = match LocalCode::decode_kind(code, SdpKind::Answer) {
                Ok(answer) => answer,
                Err(e) => {
                    self.abort_attempt(generation, HandshakeFailure::InvalidRoomCode, e.into());
                    return;
                }
            };

            match peer.set_remote_description(answer).await {
                Ok(()) => tracing::info!("Answer applied, waiting for the data channel"),
                Err(e) => self.abort_attempt(generation, HandshakeFailure::CompletionFailed, e),
            }
        }
        .instrument(tracing::info_span!("complete_connection", generation))
        .await
    }

    /// Full teardown back to `idle`. Safe to call any number of times.
    pub fn disconnect(&self) {
        let generation = self.shared.reset();
        tracing::info!(generation, "Disconnected");
    }

    /// Write `data` as JSON text if the channel is open; otherwise do nothing.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) {
        self.shared.send(data);
    }

    /// Install the single inbound handler, replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        *lock(&self.shared.handler) = Some(Arc::new(handler));
    }

    pub fn writer(&self) -> ChannelWriter<C::Peer> {
        ChannelWriter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.borrow().status
    }

    pub fn role(&self) -> Option<Role> {
        self.shared.state.borrow().role
    }

    pub fn local_code(&self) -> LocalCode {
        self.shared.state.borrow().local_code.clone()
    }

    pub fn error(&self) -> Option<HandshakeFailure> {
        self.shared.state.borrow().error
    }

    pub fn error_message(&self) -> Option<String> {
        self.shared.state.borrow().error_message()
    }

    pub fn is_channel_open(&self) -> bool {
        self.shared
            .peer()
            .1
            .is_some_and(|peer| peer.is_channel_open())
    }

    /// Reported `connected` with the channel still open; sends go out.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected && self.is_channel_open()
    }

    /// Latest state; changes whenever anything in [`ConnectionState`] does.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Every accepted status change from now on.
    pub fn transitions(&self) -> broadcast::Receiver<StatusChange> {
        self.shared.transitions.subscribe()
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> ConnectionState
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            // The sender lives as long as the engine
            Err(_) => self.state(),
        };
        state
    }

    fn abort_attempt(&self, generation: u64, failure: HandshakeFailure, cause: P2PError) {
        if matches!(cause, P2PError::Superseded) || !self.shared.is_current(generation) {
            tracing::debug!("Attempt superseded: {}", cause);
            return;
        }
        tracing::warn!("{}: {}", failure, cause);
        self.shared.fail(generation, failure);
    }

    async fn open_link(&self, generation: u64) -> Result<Arc<C::Peer>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(self.connector.open(&self.config.ice_servers, tx).await?);
        let pump = tokio::spawn(
            pump_events(Arc::downgrade(&self.shared), generation, rx)
                .instrument(tracing::debug_span!("transport_events", generation)),
        );
        self.shared.install(generation, peer.clone(), pump)?;
        Ok(peer)
    }

    async fn offer(&self, generation: u64) -> Result<LocalCode> {
        let peer = self.open_link(generation).await?;
        peer.create_channel(&self.config.channel_label).await?;
        let offer = peer.create_offer().await?;
        peer.set_local_description(offer).await?;
        self.gathered_code(peer.as_ref()).await
    }

    async fn answer(&self, generation: u64, offer: SessionDescription) -> Result<LocalCode> {
        let peer = self.open_link(generation).await?;
        peer.set_remote_description(offer).await?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer).await?;
        self.gathered_code(peer.as_ref()).await
    }

    /// Wait for gathering (bounded), then encode the local description.
    async fn gathered_code(&self, peer: &C::Peer) -> Result<LocalCode> {
        let started = instant::Instant::now();
        let limit = self.config.ice_gathering_timeout;

        match tokio::time::timeout(limit, peer.ice_gathering_complete()).await {
            Ok(()) => tracing::debug!("ICE gathering complete after {:?}", started.elapsed()),
            Err(_) => tracing::warn!(
                "⏱️ ICE gathering still running after {:?}, using partial candidates",
                limit
            ),
        }

        let desc = peer
            .local_description()
            .await
            .ok_or_else(|| P2PError::Transport("no local description".to_string()))?;
        Ok(LocalCode::encode(&desc)?)
    }
}

impl<C: PeerConnector> fmt::Debug for ConnectionEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEngine")
            .field("config", &self.config)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl<C: PeerConnector> Drop for ConnectionEngine<C> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}
