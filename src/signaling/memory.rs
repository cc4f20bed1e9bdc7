use super::hub::RoomHub;
use super::protocol::ServerFrame;
use super::{PeerId, RoomId, SignalingMessage, SignalingTransport, TransportEvent};
use crate::error::TransportError;
use crate::utils::random_id;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Транспорт поверх `RoomHub` в том же процессе
pub struct MemoryTransport {
    hub: RoomHub,
    id: PeerId,
    room: Option<RoomId>,
    outbox: mpsc::UnboundedSender<ServerFrame>,
    inbox: mpsc::UnboundedReceiver<ServerFrame>,
    closed: bool,
}

impl MemoryTransport {
    pub fn connect(hub: &RoomHub) -> Self {
        Self::with_id(hub, random_id())
    }

    pub fn with_id(hub: &RoomHub, id: impl Into<PeerId>) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        Self {
            hub: hub.clone(),
            id: id.into(),
            room: None,
            outbox,
            inbox,
            closed: false,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn join(&mut self, room: &RoomId) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.hub.join(room, &self.id, self.outbox.clone()) {
            Ok(()) => {
                self.room = Some(room.clone());
                Ok(())
            }
            // Отказ приходит событием, как и от relay сервера
            Err(TransportError::RoomFull(room)) => {
                let _ = self.outbox.send(ServerFrame::RoomFull { room });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn leave(&mut self) -> Result<(), TransportError> {
        if let Some(room) = self.room.take() {
            self.hub.leave(&room, &self.id);
        }
        Ok(())
    }

    async fn send(&mut self, message: &SignalingMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let room = self.room.as_ref().ok_or(TransportError::NotJoined)?;
        self.hub.relay(room, &self.id, message)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        let frame = self.inbox.recv().await?;
        if frame == ServerFrame::Closed {
            self.closed = true;
            self.room = None;
        }
        Some(frame.into())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Some(room) = self.room.take() {
            self.hub.leave(&room, &self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_transports_exchange_messages() {
        let hub = RoomHub::new();
        let room = RoomId::from("r");
        let mut a = MemoryTransport::with_id(&hub, "a");
        let mut b = MemoryTransport::with_id(&hub, "b");

        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();
        assert!(matches!(a.next_event().await, Some(TransportEvent::Joined { .. })));
        assert_eq!(a.next_event().await, Some(TransportEvent::MemberJoined("b".into())));
        assert!(matches!(b.next_event().await, Some(TransportEvent::Joined { .. })));

        b.send(&SignalingMessage::Offer("sdp".into())).await.unwrap();
        assert_eq!(
            a.next_event().await,
            Some(TransportEvent::Message {
                from: "b".into(),
                message: SignalingMessage::Offer("sdp".into()),
            })
        );

        drop(b);
        assert_eq!(a.next_event().await, Some(TransportEvent::MemberLeft("b".into())));
    }

    #[tokio::test]
    async fn full_room_arrives_as_event() {
        let hub = RoomHub::new();
        let room = RoomId::from("r");
        let mut a = MemoryTransport::connect(&hub);
        let mut b = MemoryTransport::connect(&hub);
        let mut c = MemoryTransport::connect(&hub);
        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();
        c.join(&room).await.unwrap();
        assert_eq!(c.next_event().await, Some(TransportEvent::RoomFull(room)));
        assert!(matches!(
            c.send(&SignalingMessage::Answer("x".into())).await,
            Err(TransportError::NotJoined)
        ));
    }

    #[tokio::test]
    async fn hub_disconnect_ends_stream() {
        let hub = RoomHub::new();
        let mut a = MemoryTransport::with_id(&hub, "a");
        a.join(&"r".into()).await.unwrap();
        let _ = a.next_event().await;
        hub.disconnect(&"a".into());
        assert_eq!(a.next_event().await, Some(TransportEvent::Disconnected));
        assert_eq!(a.next_event().await, None);
    }
}
