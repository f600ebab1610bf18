use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{AudioBackend, AudioEvent, AudioEventReceiver, AudioPlayer};
use crate::error::PlaybackError;

/// Status of a [`PlaybackSession`]. `Ended` and `Errored` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Loading,
    Playing,
    Paused,
    Ended,
    Errored,
}

impl PlaybackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackStatus::Ended | PlaybackStatus::Errored)
    }
}

/// Lifecycle transitions forwarded to the owner of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// First transition out of loading. Fires once.
    Playing,
    /// Terminal success.
    Ended,
    /// Terminal failure.
    Failed(PlaybackError),
}

struct SessionInner {
    status: PlaybackStatus,
    player: Option<Box<dyn AudioPlayer>>,
    duration_ms: Option<f64>,
    playback_rate: f32,
    started_at: Option<SystemTime>,
}

impl SessionInner {
    /// The single teardown path for the decoded audio.
    fn release(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.pause();
            player.release();
            log::debug!("Released audio for session");
        }
    }
}

/// The live state of one audio stream.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PlaybackSession")
            .field("status", &inner.status)
            .field("duration_ms", &inner.duration_ms)
            .field("playback_rate", &inner.playback_rate)
            .field("released", &inner.player.is_none())
            .finish()
    }
}

impl PlaybackSession {
    /// Load `audio` on `backend` and ask it to start playing.
    ///
    /// The receiver yields the backend's raw events; feed each one to
    /// [`PlaybackSession::observe`].
    pub fn start(
        backend: &dyn AudioBackend,
        audio: Bytes,
        playback_rate: f32,
    ) -> Result<(Self, AudioEventReceiver), PlaybackError> {
        if audio.is_empty() {
            return Err(PlaybackError::EmptyAudio);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let size = audio.len();
        let mut player = backend.load(audio, playback_rate, tx)?;
        let duration_ms = player.duration_ms();

        if let Err(e) = player.play() {
            log::warn!("Platform refused playback: {e}");
            player.release();
            return Err(e);
        }

        log::debug!(
            "Playback session loading: {size} bytes, rate={playback_rate}, duration={duration_ms:?}"
        );

        let session = Self {
            inner: Arc::new(Mutex::new(SessionInner {
                status: PlaybackStatus::Loading,
                player: Some(player),
                duration_ms,
                playback_rate,
                started_at: None,
            })),
        };
        Ok((session, rx))
    }

    /// Apply a raw backend event and return the lifecycle transition it caused, if any.
    ///
    /// After a terminal transition or [`PlaybackSession::stop`] every event is ignored.
    pub fn observe(&self, event: AudioEvent) -> Option<SessionEvent> {
        let mut inner = self.inner.lock();
        if inner.status.is_terminal() {
            return None;
        }

        match event {
            AudioEvent::LoadedMetadata { duration_ms } => {
                if duration_ms.is_finite() && duration_ms > 0.0 {
                    inner.duration_ms = Some(duration_ms);
                }
                None
            }
            AudioEvent::Playing => match inner.status {
                PlaybackStatus::Loading => {
                    inner.status = PlaybackStatus::Playing;
                    inner.started_at = Some(SystemTime::now());
                    Some(SessionEvent::Playing)
                }
                PlaybackStatus::Paused => {
                    inner.status = PlaybackStatus::Playing;
                    None
                }
                _ => None,
            },
            AudioEvent::Paused => {
                if inner.status == PlaybackStatus::Playing {
                    inner.status = PlaybackStatus::Paused;
                }
                None
            }
            AudioEvent::Ended => {
                inner.status = PlaybackStatus::Ended;
                inner.release();
                Some(SessionEvent::Ended)
            }
            AudioEvent::Error(e) => {
                inner.status = PlaybackStatus::Errored;
                inner.release();
                Some(SessionEvent::Failed(e))
            }
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().status
    }

    /// Media duration, from the player or its metadata event.
    pub fn duration_ms(&self) -> Option<f64> {
        let inner = self.inner.lock();
        inner
            .player
            .as_ref()
            .and_then(|p| p.duration_ms())
            .or(inner.duration_ms)
    }

    pub fn playback_rate(&self) -> f32 {
        self.inner.lock().playback_rate
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.inner.lock().started_at
    }

    pub fn reports_position(&self) -> bool {
        self.inner
            .lock()
            .player
            .as_ref()
            .is_some_and(|p| p.reports_position())
    }

    /// Media position. Only meaningful while playing; `None` otherwise.
    pub fn current_position_ms(&self) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.status != PlaybackStatus::Playing {
            return None;
        }
        inner.player.as_ref().and_then(|p| p.position_ms())
    }

    /// Pause and release the audio. Safe to call any number of times, from any status.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !inner.status.is_terminal() {
            inner.status = PlaybackStatus::Ended;
        }
        inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().player.is_none()
    }
}
