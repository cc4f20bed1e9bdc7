use crate::error::CommandError;
use crate::media::TrackKind;
use crate::session::{NegotiationState, Role};
use crate::signaling::PeerId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

pub(crate) enum Command {
    HangUp,
    Rejoin,
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
    Shutdown,
}

/// Снимок состояния для UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub local_id: Option<PeerId>,
    pub remote_id: Option<PeerId>,
    pub role: Role,
    pub state: NegotiationState,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            local_id: None,
            remote_id: None,
            role: Role::Unassigned,
            state: NegotiationState::Idle,
        }
    }
}

/// Управление работающим `Negotiator`. Дешёво клонируется.
#[derive(Clone)]
pub struct NegotiatorHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) cancel: Arc<watch::Sender<bool>>,
    pub(crate) status: watch::Receiver<Status>,
}

impl NegotiatorHandle {
    /// Завершает звонок. Незавершённый вызов peer connection прерывается,
    /// его результат отбрасывается.
    pub fn hang_up(&self) -> Result<(), CommandError> {
        // Флаг ставится до постановки команды в очередь,
        // чтобы прервать шаг, который выполняется прямо сейчас
        self.cancel.send_replace(true);
        self.command(Command::HangUp)
    }

    /// Новая сессия с новыми выборами ролей
    pub fn rejoin(&self) -> Result<(), CommandError> {
        self.command(Command::Rejoin)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), CommandError> {
        self.set_track_enabled(TrackKind::Audio, !muted).await
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), CommandError> {
        self.set_track_enabled(TrackKind::Video, enabled).await
    }

    pub fn shutdown(&self) -> Result<(), CommandError> {
        self.command(Command::Shutdown)
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Ждёт, пока снимок состояния не удовлетворит условию
    pub async fn wait_for(&self, pred: impl Fn(&Status) -> bool) -> Result<Status, CommandError> {
        let mut rx = self.status.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return Ok(current.clone());
                }
            }
            rx.changed().await.map_err(|_| CommandError::Stopped)?;
        }
    }

    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::SetTrackEnabled {
            kind,
            enabled,
            reply,
        })?;
        rx.await.map_err(|_| CommandError::Stopped)?
    }

    fn command(&self, cmd: Command) -> Result<(), CommandError> {
        self.commands.send(cmd).map_err(|_| CommandError::Stopped)
    }
}
