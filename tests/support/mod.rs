#![allow(dead_code)]

use async_trait::async_trait;
use duocall_lib::error::{MediaError, PeerError};
use duocall_lib::media::{LocalMedia, LocalTrack, MediaSource, StaticMedia, TrackKind};
use duocall_lib::peer::{
    IceCandidate, PeerConnection, PeerEvent, PeerEventSender, PeerFactory, SessionDescription,
};
use duocall_lib::signaling::hub::RoomHub;
use duocall_lib::signaling::memory::MemoryTransport;
use duocall_lib::{
    NegotiationState, Negotiator, NegotiatorConfig, NegotiatorHandle, RoomId, SessionEvent,
    SignalingMessage, SignalingTransport, TransportEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(String),
    AddTrack(TrackKind),
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// `set_remote_description` всегда падает
    pub reject_remote: bool,
    /// `create_offer` никогда не завершается
    pub stall_offer: bool,
    /// Кандидаты с этой подстрокой отвергаются
    pub bad_candidate: Option<String>,
}

pub struct MockPeer {
    pub name: String,
    behavior: Behavior,
    calls: Mutex<Vec<Call>>,
    events: PeerEventSender,
    offers: AtomicUsize,
    pub offer_started: Notify,
}

impl MockPeer {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::AddCandidate(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> bool {
        self.count(|c| *c == Call::Close) > 0
    }

    /// Имитирует колбэк peer connection
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        self.record(Call::CreateOffer);
        self.offer_started.notify_one();
        if self.behavior.stall_offer {
            std::future::pending::<()>().await;
        }
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("offer-{}-{n}", self.name)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.record(Call::CreateAnswer);
        Ok(SessionDescription::answer(format!("answer-{}", self.name)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(Call::SetLocal(desc));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(Call::SetRemote(desc));
        if self.behavior.reject_remote {
            return Err(PeerError::Rejected("malformed sdp".into()));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        if let Some(bad) = &self.behavior.bad_candidate {
            if candidate.candidate.contains(bad.as_str()) {
                return Err(PeerError::Rejected("bad candidate".into()));
            }
        }
        self.record(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<(), PeerError> {
        self.record(Call::AddTrack(track.kind));
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.record(Call::Close);
        Ok(())
    }
}

pub struct MockFactory {
    name: String,
    behavior: Behavior,
    created: mpsc::UnboundedSender<Arc<MockPeer>>,
}

impl MockFactory {
    pub fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<MockPeer>>) {
        Self::with_behavior(name, Behavior::default())
    }

    pub fn with_behavior(
        name: &str,
        behavior: Behavior,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<MockPeer>>) {
        let (created, rx) = mpsc::unbounded_channel();
        let factory = Arc::new(Self {
            name: name.to_string(),
            behavior,
            created,
        });
        (factory, rx)
    }
}

#[async_trait]
impl PeerFactory for MockFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = Arc::new(MockPeer {
            name: self.name.clone(),
            behavior: self.behavior.clone(),
            calls: Mutex::new(Vec::new()),
            events,
            offers: AtomicUsize::new(0),
            offer_started: Notify::new(),
        });
        let _ = self.created.send(peer.clone());
        Ok(peer)
    }
}

/// Источник, который всегда отказывает
pub struct DeniedMedia;

#[async_trait]
impl MediaSource for DeniedMedia {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        Err(MediaError::PermissionDenied)
    }

    fn set_track_enabled(&self, kind: TrackKind, _: bool) -> Result<(), MediaError> {
        Err(MediaError::NoSuchTrack(kind))
    }
}

/// Источник, который отдаёт медиа только после `open()`
#[derive(Default)]
pub struct GatedMedia {
    gate: Notify,
}

impl GatedMedia {
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl MediaSource for GatedMedia {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        self.gate.notified().await;
        Ok(LocalMedia::audio_only())
    }

    fn set_track_enabled(&self, _: TrackKind, _: bool) -> Result<(), MediaError> {
        Ok(())
    }
}

/// Участник, которым тест управляет вручную через сырые сигнальные сообщения
pub struct RawPeer {
    pub transport: MemoryTransport,
}

impl RawPeer {
    pub async fn join(hub: &RoomHub, id: &str, room: &str) -> Self {
        let mut transport = MemoryTransport::with_id(hub, id);
        transport.join(&RoomId::from(room)).await.unwrap();
        Self { transport }
    }

    pub async fn send(&mut self, message: SignalingMessage) {
        self.transport.send(&message).await.unwrap();
    }

    /// Следующее сообщение от собеседника, события состава пропускаются
    pub async fn next_message(&mut self) -> SignalingMessage {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.transport.next_event().await {
                    Some(TransportEvent::Message { message, .. }) => return message,
                    Some(_) => continue,
                    None => panic!("transport closed"),
                }
            }
        })
        .await
        .expect("no message from the negotiator")
    }

    /// Следующее сообщение, не являющееся кандидатом
    pub async fn next_description(&mut self) -> SignalingMessage {
        loop {
            let message = self.next_message().await;
            if !matches!(message, SignalingMessage::Candidate(_)) {
                return message;
            }
        }
    }

    /// Всё, что успело прийти, без ожидания
    pub async fn drain_messages(&mut self) -> Vec<SignalingMessage> {
        let mut out = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), self.transport.next_event()).await
        {
            if let TransportEvent::Message { message, .. } = event {
                out.push(message);
            }
        }
        out
    }
}

pub struct Party {
    pub handle: NegotiatorHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub peers: mpsc::UnboundedReceiver<Arc<MockPeer>>,
}

impl Party {
    pub fn spawn(hub: &RoomHub, id: &str, room: &str, config: NegotiatorConfig) -> Self {
        Self::spawn_with(
            hub,
            id,
            room,
            config,
            Behavior::default(),
            Arc::new(StaticMedia::audio_only()),
        )
    }

    pub fn spawn_with(
        hub: &RoomHub,
        id: &str,
        room: &str,
        config: NegotiatorConfig,
        behavior: Behavior,
        media: Arc<dyn MediaSource>,
    ) -> Self {
        let (factory, peers) = MockFactory::with_behavior(id, behavior);
        let transport = MemoryTransport::with_id(hub, id);
        let (handle, events, _task) =
            Negotiator::spawn(config, room.into(), Box::new(transport), factory, media);
        Self {
            handle,
            events,
            peers,
        }
    }

    pub async fn next_peer(&mut self) -> Arc<MockPeer> {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("no peer connection created")
            .expect("factory dropped")
    }

    pub async fn wait_state(&self, state: NegotiationState) {
        tokio::time::timeout(WAIT, self.handle.wait_for(|s| s.state == state))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {state:?}, at {:?}", self.handle.status()))
            .unwrap();
    }

    pub async fn expect_event(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("expected event did not arrive")
    }
}

/// Конфигурация без STUN серверов: мокам они не нужны
pub fn test_config() -> NegotiatorConfig {
    NegotiatorConfig {
        ice_servers: Vec::new(),
        ..Default::default()
    }
}

pub fn cand(text: &str) -> SignalingMessage {
    SignalingMessage::Candidate(IceCandidate::new(text))
}

/// Ждёт, пока у мока не появится вызов, удовлетворяющий условию
pub async fn eventually(peer: &MockPeer, pred: impl Fn(&[Call]) -> bool) {
    tokio::time::timeout(WAIT, async {
        loop {
            if pred(&peer.calls()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("condition not met, calls: {:?}", peer.calls()))
}
