use crate::peer::types::RemoteTrack;
use crate::session::{NegotiationState, Role};
use crate::signaling::{PeerId, RoomId};

/// Уведомления для приложения (UI, CLI)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Сигнальный канал подтвердил вход в комнату
    Joined { local_id: PeerId },
    RoleAssigned { role: Role, remote_id: PeerId },
    /// Терминальное состояние приходит ровно один раз
    StateChanged(NegotiationState),
    RemoteTrack(RemoteTrack),
    /// Соединение пропало, идёт период ожидания восстановления
    ConnectionProblem,
    ConnectionRecovered,
    /// Третий участник вошёл в комнату во время звонка
    ParticipantRejected(PeerId),
    /// Локальный участник не попал в пару
    RoomFull(RoomId),
    TransportDisconnected,
}
