//! Audio playback for one read.
//!
//! The platform audio output sits behind [`AudioBackend`] / [`AudioPlayer`].
//! A backend reports what happens to the audio by sending [`AudioEvent`]s;
//! [`PlaybackSession`] folds those raw events into its lifecycle
//!
//! ```text
//! loading ──▶ playing ◀──▶ paused
//!                │
//!                ├──▶ ended    (terminal)
//!                └──▶ errored  (terminal)
//! ```
//!
//! and forwards at most one `Playing` and at most one terminal event
//! ([`SessionEvent`]). The decoded audio is released in exactly one place:
//! on `stop()` or on the terminal transition, whichever comes first.
//!
//! # Backends
//!
//! - [`HeadlessBackend`] - wall-clock playback without an audio device. WAV
//!   payloads report their duration up front; other formats only report
//!   position, like platforms that cannot read the duration before playback.

pub mod headless;
pub mod session;

pub use headless::{silent_wav, wav_duration_ms, HeadlessBackend};
pub use session::{PlaybackSession, PlaybackStatus, SessionEvent};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::PlaybackError;

/// Raw notification from an audio backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// The media duration became known.
    LoadedMetadata { duration_ms: f64 },
    Playing,
    Paused,
    Ended,
    Error(PlaybackError),
}

pub type AudioEventSender = mpsc::UnboundedSender<AudioEvent>;
pub type AudioEventReceiver = mpsc::UnboundedReceiver<AudioEvent>;

/// Platform audio output.
pub trait AudioBackend: Send + Sync {
    /// Decode `audio` and prepare it for playback at `playback_rate`.
    ///
    /// The returned player reports its progress through `events`.
    fn load(
        &self,
        audio: Bytes,
        playback_rate: f32,
        events: AudioEventSender,
    ) -> Result<Box<dyn AudioPlayer>, PlaybackError>;
}

/// One loaded audio stream.
pub trait AudioPlayer: Send {
    /// Start or resume playback.
    ///
    /// Returns [`PlaybackError::GestureRequired`] when the platform refuses
    /// to start without a user gesture.
    fn play(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self);

    /// Current media position. `None` when the platform cannot report it.
    fn position_ms(&self) -> Option<f64>;

    /// Media duration, `None` until the platform knows it.
    fn duration_ms(&self) -> Option<f64>;

    /// Whether [`AudioPlayer::position_ms`] is worth sampling every frame.
    fn reports_position(&self) -> bool {
        true
    }

    /// Free the decoded audio. Called exactly once per player.
    fn release(&mut self);
}
