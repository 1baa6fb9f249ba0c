//! In-process transport.
//!
//! Two engines sharing one [`LoopbackNetwork`] complete a real two-code
//! handshake without sockets: the offer/answer SDP names the endpoint that
//! produced it, and applying the answer on the offer side cross-links both
//! endpoints and opens the channel.

use crate::domain::{IceServer, SdpKind, SessionDescription};
use crate::infrastructure::error::{P2PError, Result};
use crate::infrastructure::transport::{
    LinkState, PeerConnector, PeerLink, TransportEvent, TransportEventSender,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const PEER_ATTRIBUTE: &str = "a=loopback-peer:";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct NetworkInner {
    links: HashMap<Uuid, Arc<LinkCore>>,
    writes: usize,
}

/// Shared medium that loopback links register on
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector without faults
    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            network: self.clone(),
            faults: LoopbackFaults::default(),
        }
    }

    /// Total text frames written by any link
    pub fn writes(&self) -> usize {
        lock(&self.inner).writes
    }

    /// Links currently registered (not yet closed)
    pub fn link_count(&self) -> usize {
        lock(&self.inner).links.len()
    }

    /// Every live link reports a failed connection.
    ///
    /// All channels drop before any owner hears about it, so a side that
    /// tears down first never reaches its peer as a clean close.
    pub fn fail_links(&self) {
        let links: Vec<Arc<LinkCore>> = lock(&self.inner).links.values().cloned().collect();
        tracing::debug!("Severing {} loopback links", links.len());
        for core in &links {
            lock(&core.state).open = false;
        }
        for core in links {
            let _ = core.events.send(TransportEvent::LinkState(LinkState::Failed));
        }
    }

    fn register(&self, core: Arc<LinkCore>) {
        lock(&self.inner).links.insert(core.id, core);
    }

    fn unregister(&self, id: Uuid) {
        lock(&self.inner).links.remove(&id);
    }

    fn find(&self, id: Uuid) -> Option<Arc<LinkCore>> {
        lock(&self.inner).links.get(&id).cloned()
    }

    fn record_write(&self) {
        lock(&self.inner).writes += 1;
    }
}

impl fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("LoopbackNetwork")
            .field("links", &inner.links.len())
            .field("writes", &inner.writes)
            .finish()
    }
}

/// Faults a connector injects into the links it opens
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackFaults {
    pub fail_open: bool,
    pub fail_offer: bool,
    pub stall_ice_gathering: bool,
}

/// [`PeerConnector`] over a [`LoopbackNetwork`]
#[derive(Clone)]
pub struct LoopbackConnector {
    network: LoopbackNetwork,
    faults: LoopbackFaults,
}

impl LoopbackConnector {
    pub fn with_failing_open(mut self) -> Self {
        self.faults.fail_open = true;
        self
    }

    pub fn with_failing_offer(mut self) -> Self {
        self.faults.fail_offer = true;
        self
    }

    /// Gathering never completes; the engine must fall back to its timeout.
    pub fn with_stalled_ice_gathering(mut self) -> Self {
        self.faults.stall_ice_gathering = true;
        self
    }

    pub fn network(&self) -> &LoopbackNetwork {
        &self.network
    }
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    type Peer = LoopbackLink;

    async fn open(
        &self,
        _ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<LoopbackLink> {
        if self.faults.fail_open {
            return Err(P2PError::Transport("loopback open refused".to_string()));
        }

        let core = Arc::new(LinkCore {
            id: Uuid::new_v4(),
            events,
            state: Mutex::new(LinkInner::default()),
        });
        self.network.register(core.clone());
        tracing::debug!("Loopback link {} opened", core.id);

        Ok(LoopbackLink {
            core,
            network: self.network.clone(),
            faults: self.faults,
        })
    }
}

#[derive(Default)]
struct LinkInner {
    channel_label: Option<String>,
    local: Option<SessionDescription>,
    remote_id: Option<Uuid>,
    remote_kind: Option<SdpKind>,
    open: bool,
    closed: bool,
}

struct LinkCore {
    id: Uuid,
    events: TransportEventSender,
    state: Mutex<LinkInner>,
}

impl LinkCore {
    /// Mark the channel open and notify the owner. No-op if closed.
    fn open_channel(&self, label: &str) {
        {
            let mut inner = lock(&self.state);
            if inner.closed || inner.open {
                return;
            }
            inner.open = true;
            inner.channel_label.get_or_insert_with(|| label.to_string());
        }
        let _ = self.events.send(TransportEvent::ChannelOpen);
    }

    fn remote_closed(&self) {
        let was_open = {
            let mut inner = lock(&self.state);
            std::mem::replace(&mut inner.open, false)
        };
        if was_open {
            let _ = self.events.send(TransportEvent::ChannelClosed);
        }
    }
}

/// One end of a loopback connection
pub struct LoopbackLink {
    core: Arc<LinkCore>,
    network: LoopbackNetwork,
    faults: LoopbackFaults,
}

impl LoopbackLink {
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    fn description(&self, kind: SdpKind) -> SessionDescription {
        let sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n{}{}\r\n",
            self.core.id.as_u128() as u64,
            PEER_ATTRIBUTE,
            self.core.id
        );
        SessionDescription { kind, sdp }
    }
}

fn peer_of(desc: &SessionDescription) -> Option<Uuid> {
    desc.sdp
        .lines()
        .find_map(|line| line.trim().strip_prefix(PEER_ATTRIBUTE))
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
}

#[async_trait]
impl PeerLink for LoopbackLink {
    async fn create_channel(&self, label: &str) -> Result<()> {
        lock(&self.core.state).channel_label = Some(label.to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.faults.fail_offer {
            return Err(P2PError::Transport("loopback offer refused".to_string()));
        }
        Ok(self.description(SdpKind::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        match lock(&self.core.state).remote_kind {
            Some(SdpKind::Offer) => Ok(self.description(SdpKind::Answer)),
            _ => Err(P2PError::Transport(
                "cannot answer without a remote offer".to_string(),
            )),
        }
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let mut inner = lock(&self.core.state);
        if inner.closed {
            return Err(P2PError::ChannelClosed);
        }
        inner.local = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let remote_id = peer_of(&desc)
            .ok_or_else(|| P2PError::RejectedDescription("no loopback peer".to_string()))?;
        let remote = self
            .network
            .find(remote_id)
            .ok_or_else(|| P2PError::RejectedDescription(format!("unknown peer {remote_id}")))?;

        let label = {
            let mut inner = lock(&self.core.state);
            if inner.closed {
                return Err(P2PError::ChannelClosed);
            }
            inner.remote_id = Some(remote_id);
            inner.remote_kind = Some(desc.kind);
            inner.channel_label.clone()
        };

        if desc.kind != SdpKind::Answer {
            return Ok(());
        }

        // The answerer must have answered our offer
        if lock(&remote.state).remote_id != Some(self.core.id) {
            return Err(P2PError::RejectedDescription(
                "answer belongs to another offer".to_string(),
            ));
        }

        if let Some(label) = label {
            tracing::debug!("Loopback {} <-> {} linked", self.core.id, remote_id);
            self.core.open_channel(&label);
            remote.open_channel(&label);
        }
        Ok(())
    }

    async fn ice_gathering_complete(&self) {
        if self.faults.stall_ice_gathering {
            futures::future::pending::<()>().await;
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.core.state).local.clone()
    }

    fn is_channel_open(&self) -> bool {
        let inner = lock(&self.core.state);
        inner.open && !inner.closed
    }

    fn send_text(&self, text: String) -> Result<()> {
        let remote_id = {
            let inner = lock(&self.core.state);
            if !inner.open || inner.closed {
                return Err(P2PError::ChannelClosed);
            }
            inner.remote_id
        };

        let remote = remote_id
            .and_then(|id| self.network.find(id))
            .ok_or(P2PError::ChannelClosed)?;

        self.network.record_write();
        let _ = remote.events.send(TransportEvent::Message(text));
        Ok(())
    }

    fn close(&self) {
        let remote_id = {
            let mut inner = lock(&self.core.state);
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.open = false;
            inner.local = None;
            inner.remote_id.take()
        };

        self.network.unregister(self.core.id);
        tracing::debug!("Loopback link {} closed", self.core.id);

        if let Some(remote) = remote_id.and_then(|id| self.network.find(id)) {
            remote.remote_closed();
        }
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.close();
    }
}
