use crate::logger::dump_candidate;
use crate::peer::capability::PeerConnection;
use crate::peer::types::IceCandidate;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Что произошло с кандидатом, переданным в `CandidateBuffer::offer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offered {
    /// Отложен до применения remote description
    Buffered,
    Applied,
    /// Peer connection отверг кандидат; согласование продолжается
    Skipped,
}

/// Очередь удалённых ICE кандидатов, пришедших раньше remote description
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
    remote_description_set: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Применяет кандидат сразу, если remote description уже установлен,
    /// иначе откладывает его
    pub async fn offer(
        &mut self,
        pc: Option<&dyn PeerConnection>,
        candidate: IceCandidate,
    ) -> Offered {
        match pc {
            Some(pc) if self.remote_description_set => {
                dump_candidate("remote", &candidate);
                apply(pc, candidate).await
            }
            _ => {
                self.pending.push_back(candidate);
                debug!(
                    "Remote description not set yet, queuing candidate ({} pending)",
                    self.len()
                );
                Offered::Buffered
            }
        }
    }

    /// Применяет все отложенные кандидаты после установки remote description.
    /// Возвращает число успешно применённых.
    pub async fn drain(&mut self, pc: &dyn PeerConnection) -> usize {
        self.remote_description_set = true;
        if self.is_empty() {
            return 0;
        }
        debug!("Draining {} pending candidates", self.len());
        let mut applied = 0;
        while let Some(candidate) = self.pending.pop_front() {
            debug!("Applying pending candidate: {:?}", candidate.candidate);
            if apply(pc, candidate).await == Offered::Applied {
                applied += 1;
            }
        }
        applied
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.remote_description_set = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }
}

async fn apply(pc: &dyn PeerConnection, candidate: IceCandidate) -> Offered {
    match pc.add_ice_candidate(candidate).await {
        Ok(()) => Offered::Applied,
        Err(e) => {
            warn!("Failed to add ICE candidate: {e}");
            Offered::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerError;
    use crate::media::LocalTrack;
    use crate::peer::types::SessionDescription;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PeerConnection for Recorder {
        async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
            Ok(SessionDescription::offer("o"))
        }
        async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
            Ok(SessionDescription::answer("a"))
        }
        async fn set_local_description(&self, _: SessionDescription) -> Result<(), PeerError> {
            Ok(())
        }
        async fn set_remote_description(&self, _: SessionDescription) -> Result<(), PeerError> {
            Ok(())
        }
        async fn add_ice_candidate(&self, c: IceCandidate) -> Result<(), PeerError> {
            if c.candidate.contains("bad") {
                return Err(PeerError::Rejected("malformed".into()));
            }
            self.applied.lock().push(c.candidate);
            Ok(())
        }
        async fn add_track(&self, _: &LocalTrack) -> Result<(), PeerError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), PeerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn buffers_until_drain_then_applies_in_order() {
        let pc = Recorder::default();
        let mut buf = CandidateBuffer::new();

        for c in ["c1", "c2", "c3"] {
            assert_eq!(buf.offer(Some(&pc), IceCandidate::new(c)).await, Offered::Buffered);
        }
        assert!(pc.applied.lock().is_empty());
        assert_eq!(buf.len(), 3);

        assert_eq!(buf.drain(&pc).await, 3);
        assert!(buf.is_empty());
        assert_eq!(*pc.applied.lock(), vec!["c1", "c2", "c3"]);

        assert_eq!(buf.offer(Some(&pc), IceCandidate::new("c4")).await, Offered::Applied);
        assert_eq!(pc.applied.lock().len(), 4);
    }

    #[tokio::test]
    async fn buffers_without_peer_connection() {
        let mut buf = CandidateBuffer::new();
        assert_eq!(buf.offer(None, IceCandidate::new("c1")).await, Offered::Buffered);
        assert_eq!(buf.len(), 1);
    }

    #[tokio::test]
    async fn empty_drain_is_noop() {
        let pc = Recorder::default();
        let mut buf = CandidateBuffer::new();
        assert_eq!(buf.drain(&pc).await, 0);
        assert!(buf.remote_description_set());
        assert_eq!(buf.drain(&pc).await, 0);
    }

    #[tokio::test]
    async fn failing_candidate_is_skipped() {
        let pc = Recorder::default();
        let mut buf = CandidateBuffer::new();
        buf.offer(Some(&pc), IceCandidate::new("c1")).await;
        buf.offer(Some(&pc), IceCandidate::new("bad")).await;
        buf.offer(Some(&pc), IceCandidate::new("c3")).await;

        assert_eq!(buf.drain(&pc).await, 2);
        assert_eq!(*pc.applied.lock(), vec!["c1", "c3"]);
        assert_eq!(buf.offer(Some(&pc), IceCandidate::new("bad2")).await, Offered::Skipped);
    }

    #[tokio::test]
    async fn reset_forgets_remote_description() {
        let pc = Recorder::default();
        let mut buf = CandidateBuffer::new();
        buf.drain(&pc).await;
        buf.reset();
        assert_eq!(buf.offer(Some(&pc), IceCandidate::new("c1")).await, Offered::Buffered);
    }
}
