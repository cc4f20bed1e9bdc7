//! Автомат согласования звонка.
//!
//! Один `Negotiator` владеет одной комнатой. Команды, события транспорта,
//! события peer connection, результат захвата медиа и таймеры попадают в
//! один цикл и обрабатываются строго по одному. Пока шаг выполняется,
//! остальные входы ждут в своих каналах.

mod events;
mod handle;

pub use events::SessionEvent;
pub use handle::{NegotiatorHandle, Status};

use crate::config::NegotiatorConfig;
use crate::error::{CommandError, FailureReason, MediaError, PeerError};
use crate::media::{LocalMedia, LocalTrack, MediaSource};
use crate::peer::capability::{PeerConnection, PeerEvent, PeerFactory};
use crate::peer::election::elect_role;
use crate::peer::types::{ConnectionState, IceCandidate, SessionDescription};
use crate::session::{EndReason, NegotiationState, Role, Session};
use crate::signaling::{PeerId, RoomId, SignalingMessage, SignalingTransport, TransportEvent};
use handle::Command;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Сколько сообщений хранить до появления сессии
pub const EARLY_INBOX_LIMIT: usize = 64;

enum Input {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Peer(PeerEvent),
    Media(Result<LocalMedia, MediaError>),
    Deadline,
}

enum MediaSlot {
    NotRequested,
    Pending,
    Ready(LocalMedia),
    Unavailable,
}

/// Почему вызов peer connection не дал результата
enum StepError {
    Cancelled,
    TimedOut,
    Peer(PeerError),
}

/// Почему обработчик остановился на полпути
enum Abort {
    /// Идёт завершение звонка; результат отброшен
    Cancelled,
    Failed(FailureReason),
}

type Step<T> = Result<T, Abort>;

pub struct Negotiator {
    config: NegotiatorConfig,
    room_id: RoomId,
    transport: Box<dyn SignalingTransport>,
    transport_closed: bool,
    /// Потеря канала уже была сообщена
    transport_lost: bool,
    factory: Arc<dyn PeerFactory>,
    media_source: Arc<dyn MediaSource>,
    media: MediaSlot,
    media_tx: mpsc::UnboundedSender<Result<LocalMedia, MediaError>>,
    media_rx: mpsc::UnboundedReceiver<Result<LocalMedia, MediaError>>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Sender<Status>,
    local_id: Option<PeerId>,
    joined: bool,
    members: Vec<PeerId>,
    inbox: VecDeque<(PeerId, SignalingMessage)>,
    session: Option<Session>,
    /// Состояние, когда сессии нет
    detached_state: NegotiationState,
}

impl Negotiator {
    pub fn new(
        config: NegotiatorConfig,
        room_id: RoomId,
        transport: Box<dyn SignalingTransport>,
        factory: Arc<dyn PeerFactory>,
        media_source: Arc<dyn MediaSource>,
    ) -> (Self, NegotiatorHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel);
        let (status, status_rx) = watch::channel(Status::default());

        let handle = NegotiatorHandle {
            commands: commands_tx,
            cancel: cancel.clone(),
            status: status_rx,
        };
        let negotiator = Self {
            config,
            room_id,
            transport,
            transport_closed: false,
            transport_lost: false,
            factory,
            media_source,
            media: MediaSlot::NotRequested,
            media_tx,
            media_rx,
            commands,
            cancel,
            cancel_rx,
            events,
            status,
            local_id: None,
            joined: false,
            members: Vec::new(),
            inbox: VecDeque::new(),
            session: None,
            detached_state: NegotiationState::Idle,
        };
        (negotiator, handle, events_rx)
    }

    /// Создаёт автомат и запускает его в отдельной задаче
    pub fn spawn(
        config: NegotiatorConfig,
        room_id: RoomId,
        transport: Box<dyn SignalingTransport>,
        factory: Arc<dyn PeerFactory>,
        media_source: Arc<dyn MediaSource>,
    ) -> (
        NegotiatorHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<()>,
    ) {
        let (negotiator, handle, events) =
            Self::new(config, room_id, transport, factory, media_source);
        let task = tokio::spawn(negotiator.run());
        (handle, events, task)
    }

    pub async fn run(mut self) {
        info!("Joining room {}", self.room_id);
        self.join_room().await;
        if self.config.acquire_media_on_join {
            self.request_media();
        }

        loop {
            match self.next_input().await {
                Input::Command(None) | Input::Command(Some(Command::Shutdown)) => break,
                Input::Command(Some(cmd)) => self.on_command(cmd).await,
                Input::Transport(event) => self.on_transport(event).await,
                Input::Peer(event) => {
                    let result = self.on_peer_event(event).await;
                    self.finish(result).await;
                }
                Input::Media(outcome) => self.on_media(outcome).await,
                Input::Deadline => self.on_deadline().await,
            }
        }

        debug!("Negotiator for {} stopping", self.room_id);
        if let Some(session) = self.session.as_mut() {
            session.release().await;
        }
        if let Err(e) = self.transport.leave().await {
            debug!("Leave on shutdown failed: {e}");
        }
    }

    async fn next_input(&mut self) -> Input {
        let deadline = self.next_deadline();
        let peer_events = self.session.as_mut().and_then(|s| s.peer_events.as_mut());
        tokio::select! {
            biased;
            cmd = self.commands.recv() => Input::Command(cmd),
            event = self.transport.next_event(), if !self.transport_closed => Input::Transport(event),
            Some(event) = recv_opt(peer_events) => Input::Peer(event),
            Some(outcome) = self.media_rx.recv() => Input::Media(outcome),
            _ = wait_deadline(deadline) => Input::Deadline,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let session = self.session.as_ref().filter(|s| s.is_live())?;
        match (session.negotiation_deadline, session.grace_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ---------- вход в комнату ----------

    async fn join_room(&mut self) {
        match self.transport.join(&self.room_id).await {
            Ok(()) => self.transport_lost = false,
            Err(e) => {
                warn!("Failed to join room {}: {e}", self.room_id);
                self.on_transport_lost().await;
            }
        }
    }

    async fn on_transport(&mut self, event: Option<TransportEvent>) {
        let Some(event) = event else {
            debug!("Signaling transport stream ended");
            self.transport_closed = true;
            self.on_transport_lost().await;
            return;
        };

        match event {
            TransportEvent::Joined { local_id, members } => {
                info!("Joined {} as {local_id} with {} members", self.room_id, members.len());
                self.local_id = Some(local_id.clone());
                self.members = members;
                self.joined = true;
                self.emit(SessionEvent::Joined { local_id });
                self.publish();
                self.evaluate_membership().await;
            }
            TransportEvent::MemberJoined(id) => {
                if !self.members.contains(&id) {
                    self.members.push(id.clone());
                }
                let busy = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.is_live() && s.remote_id != id);
                if busy {
                    info!("Rejecting third participant {id}");
                    self.emit(SessionEvent::ParticipantRejected(id));
                } else {
                    self.evaluate_membership().await;
                }
            }
            TransportEvent::MemberLeft(id) => {
                self.members.retain(|m| m != &id);
                self.inbox.retain(|(from, _)| from != &id);
                let was_peer = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.is_live() && s.remote_id == id);
                if was_peer {
                    info!("Remote participant {id} left");
                    self.end_session(EndReason::PeerLeft).await;
                }
            }
            TransportEvent::Message { from, message } => {
                let result = self.on_message(from, message).await;
                self.finish(result).await;
            }
            TransportEvent::RoomFull(room) => {
                warn!("Room {room} is full");
                self.joined = false;
                self.emit(SessionEvent::RoomFull(room));
            }
            TransportEvent::Disconnected => self.on_transport_lost().await,
        }
    }

    async fn on_transport_lost(&mut self) {
        self.joined = false;
        if !self.transport_lost {
            warn!("Signaling transport disconnected");
            self.transport_lost = true;
            self.emit(SessionEvent::TransportDisconnected);
        }
        self.fail(FailureReason::TransportDisconnected).await;
    }

    /// Создаёт сессию, когда в комнате появилась пара.
    /// Пара - первые два участника в порядке входа.
    async fn evaluate_membership(&mut self) {
        if self.session.is_some() || !self.joined {
            return;
        }
        let Some(local_id) = self.local_id.clone() else {
            return;
        };
        if self.members.len() < 2 {
            debug!("Waiting for a second participant in {}", self.room_id);
            return;
        }

        let pair = &self.members[..2];
        if !pair.contains(&local_id) {
            warn!("{local_id} is not part of the call in {}", self.room_id);
            self.emit(SessionEvent::RoomFull(self.room_id.clone()));
            return;
        }
        let Some(remote_id) = pair.iter().find(|id| **id != local_id).cloned() else {
            return;
        };
        let Some(role) = elect_role(pair, &local_id) else {
            return;
        };
        self.start_session(local_id, remote_id, role).await;
    }

    async fn start_session(&mut self, local_id: PeerId, remote_id: PeerId, role: Role) {
        info!("Session with {remote_id}: local role {:?}", role);
        self.session = Some(Session::new(
            self.room_id.clone(),
            local_id,
            remote_id.clone(),
            role,
        ));
        self.emit(SessionEvent::RoleAssigned {
            role,
            remote_id: remote_id.clone(),
        });
        self.publish();

        let result = self.route_on_media().await;
        self.finish(result).await;

        // Сообщения, пришедшие раньше сессии, от собеседника
        let early: Vec<SignalingMessage> = std::mem::take(&mut self.inbox)
            .into_iter()
            .filter(|(from, _)| *from == remote_id)
            .map(|(_, message)| message)
            .collect();
        if !early.is_empty() {
            debug!("Replaying {} early messages from {remote_id}", early.len());
        }
        for message in early {
            let result = self.on_message(remote_id.clone(), message).await;
            self.finish(result).await;
        }
    }

    async fn route_on_media(&mut self) -> Step<()> {
        match self.media {
            MediaSlot::Ready(_) => self.begin_negotiation().await,
            MediaSlot::Unavailable => {
                // Захват уже провалился до появления пары
                self.transition(NegotiationState::AwaitingMedia);
                Err(Abort::Failed(FailureReason::MediaUnavailable))
            }
            MediaSlot::NotRequested => {
                self.request_media();
                self.transition(NegotiationState::AwaitingMedia);
                Ok(())
            }
            MediaSlot::Pending => {
                self.transition(NegotiationState::AwaitingMedia);
                Ok(())
            }
        }
    }

    // ---------- медиа ----------

    fn request_media(&mut self) {
        if !matches!(self.media, MediaSlot::NotRequested) {
            return;
        }
        debug!("Requesting local media");
        self.media = MediaSlot::Pending;
        let source = self.media_source.clone();
        let tx = self.media_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(source.acquire().await);
        });
    }

    async fn on_media(&mut self, outcome: Result<LocalMedia, MediaError>) {
        let awaiting = self
            .session
            .as_ref()
            .is_some_and(|s| s.state == NegotiationState::AwaitingMedia);
        match outcome {
            Ok(media) => {
                info!("Local media ready ({} tracks)", media.tracks.len());
                self.media = MediaSlot::Ready(media);
                if awaiting {
                    let result = self.begin_negotiation().await;
                    self.finish(result).await;
                }
            }
            Err(e) => {
                warn!("Local media unavailable: {e}");
                self.media = MediaSlot::Unavailable;
                if awaiting {
                    self.fail(FailureReason::MediaUnavailable).await;
                }
            }
        }
    }

    fn local_tracks(&self) -> Vec<LocalTrack> {
        match &self.media {
            MediaSlot::Ready(media) => media.tracks.clone(),
            _ => Vec::new(),
        }
    }

    // ---------- согласование ----------

    async fn begin_negotiation(&mut self) -> Step<()> {
        let timeout = self.config.negotiation_timeout();
        if let Some(session) = self.session.as_mut() {
            session.negotiation_deadline = Some(Instant::now() + timeout);
        }
        self.transition(NegotiationState::Negotiating);
        self.open_peer().await?;

        let (pending_offer, role) = match self.session.as_mut() {
            Some(s) => (s.pending_offer.take(), s.role()),
            None => return Ok(()),
        };
        match (pending_offer, role) {
            (Some(offer), _) => self.accept_offer(offer).await,
            (None, Role::Initiator) => self.send_offer().await,
            (None, _) => {
                debug!("Waiting for an offer from the initiator");
                Ok(())
            }
        }
    }

    /// Создаёт peer connection и подключает локальные треки.
    /// Соединение запоминается до подключения треков, чтобы его закрыли при ошибке.
    async fn open_peer(&mut self) -> Step<Arc<dyn PeerConnection>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = self.factory.clone();
        let pc = self
            .call(FailureReason::PeerConnectionUnavailable, factory.create(tx))
            .await?;
        if let Some(session) = self.session.as_mut() {
            session.peer = Some(pc.clone());
            session.peer_events = Some(rx);
        }
        for track in self.local_tracks() {
            self.call(FailureReason::PeerConnectionUnavailable, pc.add_track(&track))
                .await?;
        }
        Ok(pc)
    }

    async fn send_offer(&mut self) -> Step<()> {
        let pc = self.peer()?;
        let offer = self
            .call(FailureReason::LocalDescriptionFailed, pc.create_offer())
            .await?;
        self.call(
            FailureReason::LocalDescriptionFailed,
            pc.set_local_description(offer.clone()),
        )
        .await?;
        if let Some(session) = self.session.as_mut() {
            session.local_offer = Some(offer.sdp.clone());
        }
        info!("Sending offer");
        self.send(SignalingMessage::Offer(offer.sdp)).await
    }

    async fn accept_offer(&mut self, sdp: String) -> Step<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.state {
            NegotiationState::Idle | NegotiationState::AwaitingMedia => {
                debug!("Media not ready, holding offer from {}", session.remote_id);
                session.pending_offer = Some(sdp);
                return Ok(());
            }
            NegotiationState::Negotiating | NegotiationState::Active => {}
            _ => return Ok(()),
        }
        if session.remote_sdp.as_deref() == Some(sdp.as_str()) {
            debug!("Duplicate offer ignored");
            return Ok(());
        }
        if session.candidates.remote_description_set() {
            debug!("Renegotiation offer ignored");
            return Ok(());
        }

        // Offer шлёт только инициатор, поэтому при встречном offer он держит свой
        if session.local_offer.is_some() {
            info!("Offer collision: keeping our offer");
            return Ok(());
        }

        let pc = self.peer()?;
        self.call(
            FailureReason::RemoteDescriptionRejected,
            pc.set_remote_description(SessionDescription::offer(sdp.clone())),
        )
        .await?;
        self.apply_buffered(&pc, sdp).await;

        let answer = self
            .call(FailureReason::LocalDescriptionFailed, pc.create_answer())
            .await?;
        self.call(
            FailureReason::LocalDescriptionFailed,
            pc.set_local_description(answer.clone()),
        )
        .await?;
        info!("Sending answer");
        self.send(SignalingMessage::Answer(answer.sdp)).await
    }

    async fn accept_answer(&mut self, sdp: String) -> Step<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        if session.remote_sdp.as_deref() == Some(sdp.as_str()) {
            debug!("Duplicate answer ignored");
            return Ok(());
        }
        if session.local_offer.is_none() {
            debug!("Answer without an outstanding offer ignored");
            return Ok(());
        }
        let pc = self.peer()?;
        self.call(
            FailureReason::RemoteDescriptionRejected,
            pc.set_remote_description(SessionDescription::answer(sdp.clone())),
        )
        .await?;
        if let Some(session) = self.session.as_mut() {
            session.local_offer = None;
        }
        self.apply_buffered(&pc, sdp).await;
        Ok(())
    }

    async fn apply_buffered(&mut self, pc: &Arc<dyn PeerConnection>, sdp: String) {
        if let Some(session) = self.session.as_mut() {
            session.remote_sdp = Some(sdp);
            let applied = session.candidates.drain(&**pc).await;
            debug!("Applied {applied} buffered candidates");
        }
    }

    async fn on_candidate(&mut self, candidate: IceCandidate) {
        if let Some(session) = self.session.as_mut() {
            session
                .candidates
                .offer(session.peer.as_deref(), candidate)
                .await;
        }
    }

    async fn on_message(&mut self, from: PeerId, message: SignalingMessage) -> Step<()> {
        if self.local_id.as_ref() == Some(&from) {
            debug!("Dropping own {} echoed by the relay", message.kind());
            return Ok(());
        }
        // Без живой сессии сообщение ждёт следующей (в том числе после rejoin)
        let Some(session) = self.session.as_ref().filter(|s| s.is_live()) else {
            debug!("No live session, holding {} from {from}", message.kind());
            if self.inbox.len() >= EARLY_INBOX_LIMIT {
                warn!("Early inbox full, dropping oldest message");
                self.inbox.pop_front();
            }
            self.inbox.push_back((from, message));
            return Ok(());
        };
        if session.remote_id != from {
            debug!("Ignoring {} from non-participant {from}", message.kind());
            return Ok(());
        }

        debug!("Received {} from {from}", message.kind());
        match message {
            SignalingMessage::Offer(sdp) => self.accept_offer(sdp).await,
            SignalingMessage::Answer(sdp) => self.accept_answer(sdp).await,
            SignalingMessage::Candidate(candidate) => {
                self.on_candidate(candidate).await;
                Ok(())
            }
        }
    }

    // ---------- события peer connection ----------

    async fn on_peer_event(&mut self, event: PeerEvent) -> Step<()> {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return Ok(());
        };
        match event {
            PeerEvent::IceCandidate(Some(candidate)) => {
                self.send(SignalingMessage::Candidate(candidate)).await
            }
            PeerEvent::IceCandidate(None) => {
                debug!("Local candidate gathering complete");
                Ok(())
            }
            PeerEvent::RemoteTrack(track) => {
                self.emit(SessionEvent::RemoteTrack(track));
                Ok(())
            }
            PeerEvent::ConnectionState(state) => {
                debug!("Connection state: {:?} in {:?}", state, session.state);
                match (state, session.state) {
                    (ConnectionState::Connected, NegotiationState::Negotiating) => {
                        session.negotiation_deadline = None;
                        self.transition(NegotiationState::Active);
                    }
                    (ConnectionState::Connected, NegotiationState::Active) => {
                        if session.grace_deadline.take().is_some() {
                            info!("Connection recovered during grace period");
                            self.emit(SessionEvent::ConnectionRecovered);
                        }
                    }
                    (ConnectionState::Disconnected, NegotiationState::Active) => {
                        let grace = self.config.disconnect_grace();
                        if grace.is_zero() {
                            return Err(Abort::Failed(FailureReason::ConnectionLost));
                        }
                        if session.grace_deadline.is_none() {
                            info!("Connection problem, waiting {} s", grace.as_secs());
                            session.grace_deadline = Some(Instant::now() + grace);
                            self.emit(SessionEvent::ConnectionProblem);
                        }
                    }
                    (
                        ConnectionState::Failed,
                        NegotiationState::Negotiating | NegotiationState::Active,
                    ) => return Err(Abort::Failed(FailureReason::ConnectionLost)),
                    _ => {}
                }
                Ok(())
            }
        }
    }

    async fn on_deadline(&mut self) {
        let now = Instant::now();
        let Some(session) = self.session.as_ref().filter(|s| s.is_live()) else {
            return;
        };
        if session.negotiation_deadline.is_some_and(|d| d <= now) {
            warn!("Negotiation with {} timed out", session.remote_id);
            self.fail(FailureReason::NegotiationTimeout).await;
        } else if session.grace_deadline.is_some_and(|d| d <= now) {
            warn!("Connection with {} did not recover", session.remote_id);
            self.fail(FailureReason::ConnectionLost).await;
        }
    }

    // ---------- команды ----------

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::HangUp => self.hang_up().await,
            Command::Rejoin => self.rejoin().await,
            Command::SetTrackEnabled {
                kind,
                enabled,
                reply,
            } => {
                let state = self.current_state();
                let missing = match &self.media {
                    MediaSlot::Ready(media) => !media.has(kind),
                    _ => false,
                };
                let result = if state != NegotiationState::Active {
                    Err(CommandError::NotActive(state))
                } else if missing {
                    Err(CommandError::Media(MediaError::NoSuchTrack(kind)))
                } else {
                    self.media_source
                        .set_track_enabled(kind, enabled)
                        .map_err(CommandError::from)
                };
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    async fn hang_up(&mut self) {
        info!("Hanging up");
        match self.session.as_ref().map(Session::is_live) {
            Some(true) => self.end_session(EndReason::HangUp).await,
            Some(false) => {}
            None => {
                self.detached_state = NegotiationState::Ended(EndReason::HangUp);
                self.emit(SessionEvent::StateChanged(self.detached_state));
                self.publish();
            }
        }
        if self.joined {
            if let Err(e) = self.transport.leave().await {
                warn!("Failed to leave room: {e}");
            }
        }
        self.joined = false;
        self.members.clear();
        self.inbox.clear();
    }

    async fn rejoin(&mut self) {
        info!("Rejoining {}", self.room_id);
        self.cancel.send_replace(false);
        if let Some(mut old) = self.session.take() {
            old.release().await;
        }
        self.detached_state = NegotiationState::Idle;
        if matches!(self.media, MediaSlot::Unavailable) {
            self.media = MediaSlot::NotRequested;
        }
        self.publish();

        if self.joined {
            self.evaluate_membership().await;
        } else {
            self.join_room().await;
        }
        if self.config.acquire_media_on_join {
            self.request_media();
        }
    }

    // ---------- переходы ----------

    async fn finish(&mut self, result: Step<()>) {
        match result {
            Ok(()) => {}
            Err(Abort::Cancelled) => debug!("Step cancelled by hang-up"),
            Err(Abort::Failed(reason)) => self.fail(reason).await,
        }
    }

    async fn fail(&mut self, reason: FailureReason) {
        if let Some(session) = self.session.as_mut().filter(|s| s.is_live()) {
            warn!("Session with {} failed: {reason}", session.remote_id);
            session.release().await;
            self.transition(NegotiationState::Failed(reason));
        }
    }

    async fn end_session(&mut self, reason: EndReason) {
        if let Some(session) = self.session.as_mut().filter(|s| s.is_live()) {
            info!("Session with {} ended: {:?}", session.remote_id, reason);
            session.release().await;
            self.transition(NegotiationState::Ended(reason));
        }
    }

    fn transition(&mut self, state: NegotiationState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == state || session.state.is_terminal() {
            return;
        }
        debug!("{:?} -> {:?}", session.state, state);
        session.state = state;
        if state.is_terminal() {
            // Всё, что пришло до конца сессии, относится к ней
            self.inbox.clear();
        }
        self.emit(SessionEvent::StateChanged(state));
        self.publish();
    }

    fn current_state(&self) -> NegotiationState {
        self.session
            .as_ref()
            .map_or(self.detached_state, |s| s.state)
    }

    fn publish(&self) {
        let live = self.session.as_ref().filter(|s| s.is_live());
        let status = Status {
            local_id: self.local_id.clone(),
            remote_id: self.session.as_ref().map(|s| s.remote_id.clone()),
            role: live.map_or(Role::Unassigned, |s| s.role()),
            state: self.current_state(),
        };
        self.status.send_replace(status);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    // ---------- вспомогательные ----------

    fn peer(&self) -> Step<Arc<dyn PeerConnection>> {
        self.session
            .as_ref()
            .and_then(|s| s.peer.clone())
            .ok_or(Abort::Failed(FailureReason::PeerConnectionUnavailable))
    }

    /// Отправка в сигнальный канал. После hang-up ничего не отправляется.
    async fn send(&mut self, message: SignalingMessage) -> Step<()> {
        if *self.cancel_rx.borrow() {
            debug!("Hang-up pending, not sending {}", message.kind());
            return Err(Abort::Cancelled);
        }
        if let Err(e) = self.transport.send(&message).await {
            warn!("Failed to send {}: {e}", message.kind());
            return Err(Abort::Failed(FailureReason::TransportDisconnected));
        }
        Ok(())
    }

    /// Вызов peer connection с учётом hang-up и таймаута согласования
    async fn call<T>(
        &mut self,
        reason: FailureReason,
        step: impl Future<Output = Result<T, PeerError>>,
    ) -> Step<T> {
        let deadline = self.session.as_ref().and_then(|s| s.negotiation_deadline);
        settle(guarded(&mut self.cancel_rx, deadline, step).await, reason)
    }
}

fn settle<T>(result: Result<T, StepError>, reason: FailureReason) -> Step<T> {
    match result {
        Ok(value) => Ok(value),
        Err(StepError::Cancelled) => Err(Abort::Cancelled),
        Err(StepError::TimedOut) => Err(Abort::Failed(FailureReason::NegotiationTimeout)),
        Err(StepError::Peer(e)) => {
            warn!("Peer connection call failed: {e}");
            Err(Abort::Failed(reason))
        }
    }
}

async fn guarded<T>(
    cancel: &mut watch::Receiver<bool>,
    deadline: Option<Instant>,
    step: impl Future<Output = Result<T, PeerError>>,
) -> Result<T, StepError> {
    tokio::select! {
        biased;
        _ = hung_up(cancel) => Err(StepError::Cancelled),
        _ = wait_deadline(deadline) => Err(StepError::TimedOut),
        result = step => result.map_err(StepError::Peer),
    }
}

async fn hung_up(cancel: &mut watch::Receiver<bool>) {
    loop {
        let set = *cancel.borrow_and_update();
        if set {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
