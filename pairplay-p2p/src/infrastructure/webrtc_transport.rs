use crate::domain::{IceServer, SdpKind, SessionDescription};
use crate::infrastructure::error::{P2PError, Result};
use crate::infrastructure::transport::{
    LinkState, PeerConnector, PeerLink, TransportEvent, TransportEventSender,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transport_err(context: &str, err: webrtc::Error) -> P2PError {
    P2PError::Transport(format!("{context}: {err}"))
}

fn build_ice_servers(ice_servers: &[IceServer]) -> Vec<RTCIceServer> {
    ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn map_link_state(state: RTCPeerConnectionState) -> LinkState {
    match state {
        RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => LinkState::New,
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
    };
    parsed.map_err(|e| P2PError::RejectedDescription(e.to_string()))
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        other => {
            return Err(P2PError::Transport(format!(
                "unexpected description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

/// [`PeerConnector`] backed by webrtc-rs
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcConnector;

impl WebRtcConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    type Peer = WebRtcLink;

    async fn open(
        &self,
        ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<WebRtcLink> {
        tracing::info!("Opening peer connection with {} ICE servers", ice_servers.len());
        for (i, server) in ice_servers.iter().enumerate() {
            if server.has_auth() {
                tracing::debug!("  ICE Server {}: {} (with auth)", i + 1, server.urls.join(", "));
            } else {
                tracing::debug!("  ICE Server {}: {}", i + 1, server.urls.join(", "));
            }
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| transport_err("codec registration", e))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| transport_err("interceptor registration", e))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: build_ice_servers(ice_servers),
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| transport_err("peer connection", e))?,
        );

        let shared = Arc::new(LinkShared {
            events,
            channel: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
        });

        let state_events = shared.events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            tracing::debug!("Peer connection state: {}", state);
            let _ = state_events.send(TransportEvent::LinkState(map_link_state(state)));
            Box::pin(async {})
        }));

        let candidate_sink = Arc::downgrade(&shared);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let (Some(candidate), Some(shared)) = (candidate, candidate_sink.upgrade()) {
                let summary = format!("{} {}:{}", candidate.typ, candidate.address, candidate.port);
                tracing::debug!("ICE candidate gathered: {}", summary);
                lock(&shared.candidates).push(summary);
            }
            Box::pin(async {})
        }));

        // Answer side: adopt the channel the offerer created
        let channel_sink = Arc::downgrade(&shared);
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let channel_sink = channel_sink.clone();
            Box::pin(async move {
                if let Some(shared) = channel_sink.upgrade() {
                    tracing::info!("Remote data channel '{}' received", dc.label());
                    shared.attach_channel(dc);
                }
            })
        }));

        Ok(WebRtcLink {
            pc,
            shared,
            closed: AtomicBool::new(false),
        })
    }
}

struct LinkShared {
    events: TransportEventSender,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    candidates: Mutex<Vec<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl LinkShared {
    fn attach_channel(&self, dc: Arc<RTCDataChannel>) {
        let open_events = self.events.clone();
        let open_label = dc.label().to_string();
        dc.on_open(Box::new(move || {
            tracing::info!("🟢 Data channel '{}' open", open_label);
            let _ = open_events.send(TransportEvent::ChannelOpen);
            Box::pin(async {})
        }));

        let close_events = self.events.clone();
        dc.on_close(Box::new(move || {
            tracing::info!("Data channel closed");
            let _ = close_events.send(TransportEvent::ChannelClosed);
            Box::pin(async {})
        }));

        let message_events = self.events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = message_events.send(TransportEvent::Message(text));
                    }
                    Err(e) => tracing::debug!("Dropping non UTF-8 frame: {}", e),
                }
            } else {
                tracing::debug!("Dropping binary frame ({} bytes)", msg.data.len());
            }
            Box::pin(async {})
        }));

        // Single writer keeps frames in call order without blocking callers
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer = dc.clone();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = writer.send_text(text).await {
                    tracing::warn!("Data channel write failed: {}", e);
                    break;
                }
            }
        });

        *lock(&self.outbound) = Some(tx);
        *lock(&self.channel) = Some(dc);
    }
}

/// One webrtc-rs peer connection
pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    shared: Arc<LinkShared>,
    closed: AtomicBool,
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_channel(&self, label: &str) -> Result<()> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| transport_err("data channel", e))?;
        self.shared.attach_channel(dc);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| transport_err("create offer", e))?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| transport_err("create answer", e))?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| transport_err("set local description", e))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| P2PError::RejectedDescription(e.to_string()))
    }

    async fn ice_gathering_complete(&self) {
        if self.pc.ice_gathering_state() != RTCIceGatheringState::Complete {
            let mut done = self.pc.gathering_complete_promise().await;
            let _ = done.recv().await;
        }
        tracing::debug!(
            "ICE gathering complete: [{}]",
            lock(&self.shared.candidates).join(", ")
        );
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc(desc).ok()
    }

    fn is_channel_open(&self) -> bool {
        lock(&self.shared.channel)
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == RTCDataChannelState::Open)
    }

    fn send_text(&self, text: String) -> Result<()> {
        if !self.is_channel_open() {
            return Err(P2PError::ChannelClosed);
        }
        lock(&self.shared.outbound)
            .as_ref()
            .ok_or(P2PError::ChannelClosed)?
            .send(text)
            .map_err(|_| P2PError::ChannelClosed)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        lock(&self.shared.candidates).clear();
        lock(&self.shared.outbound).take();
        let channel = lock(&self.shared.channel).take();
        let pc = self.pc.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(dc) = channel {
                        let _ = dc.close().await;
                    }
                    if let Err(e) = pc.close().await {
                        tracing::warn!("Peer connection close failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime available, peer connection dropped unclosed"),
        }
    }
}

impl Drop for WebRtcLink {
    fn drop(&mut self) {
        self.close();
    }
}
