use super::protocol::ServerFrame;
use super::{PeerId, RoomId, SignalingMessage};
use crate::config::ROOM_CAPACITY;
use crate::error::TransportError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type Outbox = mpsc::UnboundedSender<ServerFrame>;

struct Member {
    id: PeerId,
    outbox: Outbox,
}

/// Реестр комнат. Общий для relay сервера и `MemoryTransport`.
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<RoomId, Vec<Member>>>>,
    capacity: usize,
    echo: bool,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::with_capacity(ROOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            echo: false,
        }
    }

    /// Хаб, который возвращает отправителю его же сообщения,
    /// как это делают публичные pub/sub сервисы
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Добавляет участника и рассылает снимок состава.
    /// Повторный вход того же id только обновляет его канал.
    pub fn join(&self, room: &RoomId, id: &PeerId, outbox: Outbox) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let members = rooms.entry(room.clone()).or_default();

        if let Some(i) = members.iter().position(|m| &m.id == id) {
            debug!("{id} re-joined {room}");
            members[i].outbox = outbox;
        } else {
            if members.len() >= self.capacity {
                info!("Room {room} is full, refusing {id}");
                if members.is_empty() {
                    rooms.remove(room);
                }
                return Err(TransportError::RoomFull(room.clone()));
            }
            for other in members.iter() {
                let _ = other.outbox.send(ServerFrame::MemberJoined { id: id.clone() });
            }
            members.push(Member {
                id: id.clone(),
                outbox,
            });
            info!("{id} joined {room} ({} members)", members.len());
        }

        let snapshot: Vec<PeerId> = members.iter().map(|m| m.id.clone()).collect();
        if let Some(me) = members.iter().find(|m| &m.id == id) {
            let _ = me.outbox.send(ServerFrame::Joined {
                id: id.clone(),
                room: room.clone(),
                members: snapshot,
            });
        }
        Ok(())
    }

    /// Убирает участника из комнаты; `false`, если его там не было
    pub fn leave(&self, room: &RoomId, id: &PeerId) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| &m.id != id);
        if members.len() == before {
            return false;
        }
        info!("{id} left {room}");
        for other in members.iter() {
            let _ = other.outbox.send(ServerFrame::MemberLeft { id: id.clone() });
        }
        if members.is_empty() {
            rooms.remove(room);
        }
        true
    }

    /// Пересылает сообщение остальным участникам комнаты
    pub fn relay(
        &self,
        room: &RoomId,
        from: &PeerId,
        message: &SignalingMessage,
    ) -> Result<(), TransportError> {
        let rooms = self.rooms.lock();
        let members = rooms
            .get(room)
            .filter(|members| members.iter().any(|m| &m.id == from))
            .ok_or(TransportError::NotJoined)?;

        debug!("relay {} from {from} in {room}", message.kind());
        for member in members.iter().filter(|m| self.echo || &m.id != from) {
            if member
                .outbox
                .send(ServerFrame::Message {
                    from: from.clone(),
                    message: message.clone(),
                })
                .is_err()
            {
                warn!("Outbox of {} is closed", member.id);
            }
        }
        Ok(())
    }

    /// Принудительно отключает участника от всех комнат
    pub fn disconnect(&self, id: &PeerId) {
        let rooms: Vec<RoomId> = {
            let rooms = self.rooms.lock();
            rooms
                .iter()
                .filter(|(_, members)| members.iter().any(|m| &m.id == id))
                .map(|(room, _)| room.clone())
                .collect()
        };
        for room in rooms {
            if let Some(outbox) = self.outbox_of(&room, id) {
                let _ = outbox.send(ServerFrame::Closed);
            }
            self.leave(&room, id);
        }
    }

    /// Участники комнаты в порядке входа
    pub fn members(&self, room: &RoomId) -> Vec<PeerId> {
        self.rooms
            .lock()
            .get(room)
            .map(|members| members.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    fn outbox_of(&self, room: &RoomId, id: &PeerId) -> Option<Outbox> {
        self.rooms
            .lock()
            .get(room)?
            .iter()
            .find(|m| &m.id == id)
            .map(|m| m.outbox.clone())
    }
}
