//! Локальное медиа: описание треков и внешний источник захвата.
//!
//! Захват и рендеринг живут вне ядра. Ядро видит только набор
//! дескрипторов треков и умеет включать/выключать их.

use crate::error::MediaError;
use crate::utils::random_id;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Дескриптор локального трека
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

impl LocalTrack {
    pub fn audio(stream_id: &str) -> Self {
        Self {
            id: format!("audio-{}", random_id()),
            stream_id: stream_id.to_string(),
            kind: TrackKind::Audio,
        }
    }

    pub fn video(stream_id: &str) -> Self {
        Self {
            id: format!("video-{}", random_id()),
            stream_id: stream_id.to_string(),
            kind: TrackKind::Video,
        }
    }
}

/// Локальный медиа поток, готовый к передаче
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub stream_id: String,
    pub tracks: Vec<LocalTrack>,
}

impl LocalMedia {
    pub fn audio_only() -> Self {
        let stream_id = random_id();
        Self {
            tracks: vec![LocalTrack::audio(&stream_id)],
            stream_id,
        }
    }

    pub fn audio_video() -> Self {
        let stream_id = random_id();
        Self {
            tracks: vec![LocalTrack::audio(&stream_id), LocalTrack::video(&stream_id)],
            stream_id,
        }
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// Внешний источник медиа (камера, микрофон, файл)
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Запрашивает локальный поток. Может долго ждать разрешения пользователя.
    async fn acquire(&self) -> Result<LocalMedia, MediaError>;

    /// Включает или выключает отправку трека данного типа
    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<(), MediaError>;
}

/// Источник с заранее известным набором треков
pub struct StaticMedia {
    video: bool,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
}

impl StaticMedia {
    pub fn audio_only() -> Self {
        Self::new(false)
    }

    pub fn audio_video() -> Self {
        Self::new(true)
    }

    fn new(video: bool) -> Self {
        Self {
            video,
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(video),
        }
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled.load(Ordering::SeqCst),
            TrackKind::Video => self.video_enabled.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl MediaSource for StaticMedia {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        Ok(if self.video {
            LocalMedia::audio_video()
        } else {
            LocalMedia::audio_only()
        })
    }

    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<(), MediaError> {
        match kind {
            TrackKind::Audio => self.audio_enabled.store(enabled, Ordering::SeqCst),
            TrackKind::Video if self.video => self.video_enabled.store(enabled, Ordering::SeqCst),
            TrackKind::Video => return Err(MediaError::NoSuchTrack(kind)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn audio_only_source_has_no_video() {
        let media = StaticMedia::audio_only();
        let local = media.acquire().await.unwrap();
        assert!(local.has(TrackKind::Audio));
        assert!(!local.has(TrackKind::Video));
        assert_eq!(
            media.set_track_enabled(TrackKind::Video, false),
            Err(MediaError::NoSuchTrack(TrackKind::Video))
        );
    }

    #[test]
    fn tracks_share_stream_id() {
        let local = LocalMedia::audio_video();
        assert_eq!(local.tracks.len(), 2);
        assert!(local.tracks.iter().all(|t| t.stream_id == local.stream_id));
    }

    #[test]
    fn toggling_is_observable() {
        let media = StaticMedia::audio_video();
        media.set_track_enabled(TrackKind::Audio, false).unwrap();
        assert!(!media.is_enabled(TrackKind::Audio));
        assert!(media.is_enabled(TrackKind::Video));
    }
}
