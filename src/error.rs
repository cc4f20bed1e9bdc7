//! Типы ошибок ядра согласования

use crate::media::TrackKind;
use crate::session::NegotiationState;
use crate::signaling::RoomId;
use thiserror::Error;

/// Причина, по которой сессия перешла в `Failed`
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Внешний источник медиа не смог отдать локальный поток
    #[error("local media unavailable")]
    MediaUnavailable,

    /// Обмен offer/answer не уложился в таймаут
    #[error("negotiation timed out")]
    NegotiationTimeout,

    /// Peer connection отверг удалённый offer или answer
    #[error("remote description rejected")]
    RemoteDescriptionRejected,

    /// Отдельный кандидат не применился. Сессию не завершает.
    #[error("ICE candidate could not be applied")]
    IceApplyFailed,

    /// Сигнальный канал упал
    #[error("signaling transport disconnected")]
    TransportDisconnected,

    /// Не удалось создать peer connection или подключить треки
    #[error("peer connection unavailable")]
    PeerConnectionUnavailable,

    /// Не удалось создать или применить локальное описание
    #[error("local description failed")]
    LocalDescriptionFailed,

    /// Peer connection сообщил failed/disconnected
    #[error("connection lost")]
    ConnectionLost,
}

/// Ошибки peer connection capability
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("webrtc: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Ошибки сигнального транспорта
#[derive(Error, Debug)]
pub enum TransportError {
    /// Канал уже закрыт
    #[error("transport closed")]
    Closed,

    /// Отправка без входа в комнату
    #[error("not joined to a room")]
    NotJoined,

    /// В комнате уже два участника
    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ошибки внешнего источника медиа
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("media access denied")]
    PermissionDenied,

    #[error("no capture device found")]
    NotFound,

    #[error("media unavailable: {0}")]
    Unavailable(String),

    #[error("no local {0:?} track")]
    NoSuchTrack(TrackKind),
}

/// Ошибки команд, отправленных через `NegotiatorHandle`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("operation requires an active session (state: {0:?})")]
    NotActive(NegotiationState),

    #[error("local media is not ready")]
    MediaNotReady,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("negotiator stopped")]
    Stopped,
}

/// Ошибки загрузки конфигурации
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
