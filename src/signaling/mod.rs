//! Сигнальный канал: контракт транспорта и формат сообщений.
//!
//! Ядро не знает, как устроен канал. Ему нужны четыре операции:
//! войти в комнату, выйти, отправить сообщение, получить следующее событие.

pub mod hub;
pub mod memory;
pub mod protocol;
pub mod relay;
pub mod ws;

use crate::error::TransportError;
use crate::peer::types::IceCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Идентификатор участника, выданный сигнальным каналом
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PeerId(pub String);

/// Идентификатор комнаты
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Сообщение между участниками: `{"type": "...", "payload": ...}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer(String),
    Answer(String),
    Candidate(IceCandidate),
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
        }
    }
}

/// События сигнального канала
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Вход в комнату подтверждён. `members` включает локального участника.
    Joined {
        local_id: PeerId,
        members: Vec<PeerId>,
    },
    MemberJoined(PeerId),
    MemberLeft(PeerId),
    Message {
        from: PeerId,
        message: SignalingMessage,
    },
    RoomFull(RoomId),
    Disconnected,
}

#[async_trait]
pub trait SignalingTransport: Send {
    async fn join(&mut self, room: &RoomId) -> Result<(), TransportError>;

    async fn leave(&mut self) -> Result<(), TransportError>;

    /// Отправка без подтверждения доставки
    async fn send(&mut self, message: &SignalingMessage) -> Result<(), TransportError>;

    /// Следующее событие канала; `None` означает, что канал закрыт.
    /// Должен быть cancel-safe: его вызывают внутри `select!`.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}
