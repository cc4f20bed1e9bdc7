use crate::error::FailureReason;
use crate::peer::buffer::CandidateBuffer;
use crate::peer::capability::{PeerConnection, PeerEvent};
use crate::signaling::{PeerId, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Роль участника в обмене offer/answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
    Unassigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    HangUp,
    PeerLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    AwaitingMedia,
    Negotiating,
    Active,
    Ended(EndReason),
    Failed(FailureReason),
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended(_) | Self::Failed(_))
    }
}

/// Один звонок между двумя участниками.
///
/// Роль фиксируется при создании и не меняется. Peer connection
/// существует не более одного за раз.
pub struct Session {
    pub room_id: RoomId,
    pub local_id: PeerId,
    pub remote_id: PeerId,
    role: Role,
    pub state: NegotiationState,
    pub peer: Option<Arc<dyn PeerConnection>>,
    pub peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    pub candidates: CandidateBuffer,
    /// Offer, пришедший до готовности медиа
    pub pending_offer: Option<String>,
    /// Наш отправленный offer, ожидающий answer
    pub local_offer: Option<String>,
    /// Последнее применённое удалённое описание
    pub remote_sdp: Option<String>,
    pub negotiation_deadline: Option<Instant>,
    pub grace_deadline: Option<Instant>,
}

impl Session {
    pub fn new(room_id: RoomId, local_id: PeerId, remote_id: PeerId, role: Role) -> Self {
        Self {
            room_id,
            local_id,
            remote_id,
            role,
            state: NegotiationState::Idle,
            peer: None,
            peer_events: None,
            candidates: CandidateBuffer::new(),
            pending_offer: None,
            local_offer: None,
            remote_sdp: None,
            negotiation_deadline: None,
            grace_deadline: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Закрывает peer connection и очищает всё, что относится к текущей попытке
    pub async fn release(&mut self) {
        self.peer_events = None;
        if let Some(pc) = self.peer.take() {
            debug!("Closing peer connection with {}", self.remote_id);
            if let Err(e) = pc.close().await {
                warn!("Error closing peer connection: {e}");
            }
        }
        self.candidates.reset();
        self.pending_offer = None;
        self.local_offer = None;
        self.remote_sdp = None;
        self.negotiation_deadline = None;
        self.grace_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(NegotiationState::Ended(EndReason::HangUp).is_terminal());
        assert!(NegotiationState::Failed(FailureReason::NegotiationTimeout).is_terminal());
        assert!(!NegotiationState::Active.is_terminal());
        assert!(!NegotiationState::AwaitingMedia.is_terminal());
    }

    #[tokio::test]
    async fn release_clears_attempt_state() {
        let mut s = Session::new("r".into(), "a".into(), "b".into(), Role::Initiator);
        s.pending_offer = Some("offer".into());
        s.local_offer = Some("mine".into());
        s.negotiation_deadline = Some(Instant::now());
        s.release().await;
        assert!(s.peer.is_none());
        assert!(s.pending_offer.is_none());
        assert!(s.local_offer.is_none());
        assert!(s.negotiation_deadline.is_none());
        assert!(s.candidates.is_empty());
    }
}
