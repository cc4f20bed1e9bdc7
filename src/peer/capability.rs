//! Абстракция peer connection, которой пользуется автомат согласования.

use crate::error::PeerError;
use crate::media::LocalTrack;
use crate::peer::types::{ConnectionState, IceCandidate, RemoteTrack, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Асинхронные уведомления от peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Новый локальный кандидат; `None` - сбор завершён
    IceCandidate(Option<IceCandidate>),
    ConnectionState(ConnectionState),
    RemoteTrack(RemoteTrack),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    async fn add_track(&self, track: &LocalTrack) -> Result<(), PeerError>;

    async fn close(&self) -> Result<(), PeerError>;
}

/// Создаёт новые peer connection. События соединения уходят в `events`.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerConnection>, PeerError>;
}
