//! Кадры между клиентом и relay сервером.
//!
//! Клиент никогда не указывает отправителя: relay сам подставляет id,
//! который выдал соединению.

use super::{PeerId, RoomId, SignalingMessage, TransportEvent};
use serde::{Deserialize, Serialize};

/// Клиент → relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { room: RoomId },
    Leave,
    Signal { message: SignalingMessage },
}

/// Relay → клиент
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Подтверждение входа: свой id и участники в порядке входа
    Joined {
        id: PeerId,
        room: RoomId,
        members: Vec<PeerId>,
    },
    MemberJoined {
        id: PeerId,
    },
    MemberLeft {
        id: PeerId,
    },
    Message {
        from: PeerId,
        message: SignalingMessage,
    },
    RoomFull {
        room: RoomId,
    },
    /// Relay закрывает соединение
    Closed,
}

impl From<ServerFrame> for TransportEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Joined { id, members, .. } => TransportEvent::Joined {
                local_id: id,
                members,
            },
            ServerFrame::MemberJoined { id } => TransportEvent::MemberJoined(id),
            ServerFrame::MemberLeft { id } => TransportEvent::MemberLeft(id),
            ServerFrame::Message { from, message } => TransportEvent::Message { from, message },
            ServerFrame::RoomFull { room } => TransportEvent::RoomFull(room),
            ServerFrame::Closed => TransportEvent::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_on_the_wire() {
        assert_eq!(
            serde_json::to_value(ClientFrame::Join { room: "lobby".into() }).unwrap(),
            json!({"op": "join", "room": "lobby"})
        );
        let signal = ClientFrame::Signal {
            message: SignalingMessage::Answer("v=0".into()),
        };
        assert_eq!(
            serde_json::to_value(signal).unwrap(),
            json!({"op": "signal", "message": {"type": "answer", "payload": "v=0"}})
        );
    }

    #[test]
    fn server_frame_becomes_event() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "event": "joined", "id": "b", "room": "lobby", "members": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(
            TransportEvent::from(frame),
            TransportEvent::Joined {
                local_id: "b".into(),
                members: vec!["a".into(), "b".into()],
            }
        );
        let closed: ServerFrame = serde_json::from_value(json!({"event": "closed"})).unwrap();
        assert_eq!(TransportEvent::from(closed), TransportEvent::Disconnected);
    }
}
