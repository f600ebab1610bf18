use std::fmt;

use serde::{Deserialize, Serialize};

/// Failures of the audio output itself.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Audio payload is empty")]
    EmptyAudio,
    #[error(
        "Playback was blocked by the platform. Audio requires a user gesture \
         (click or key press) before it can start."
    )]
    GestureRequired,
    #[error("Audio could not be decoded: {0}")]
    Decode(String),
    #[error("Audio playback failed: {0}")]
    Failed(String),
}

impl PlaybackError {
    /// Actionable hint for the user, when the failure cause is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PlaybackError::GestureRequired => {
                Some("Tap the stanza again to start reading; playback needs a user gesture.")
            }
            PlaybackError::Decode(_) | PlaybackError::EmptyAudio => {
                Some("The audio could not be played. Try another voice.")
            }
            PlaybackError::Failed(_) => None,
        }
    }
}

/// Everything that can end a read request early.
///
/// None of these are retried; retrying is a fresh read request.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("Please select a voice before reading")]
    MissingVoice,
    #[error("No words found in segment")]
    EmptySegment,
    #[error("Speed multiplier must be positive, got {0}")]
    InvalidSpeed(f64),
    #[error("Speech request failed{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },
    #[error("Speech service returned no audio")]
    EmptyAudio,
    #[error("Text-to-speech error: {0}")]
    Synthesis(String),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("Invalid engine config: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ReadError {
    fn from(e: reqwest::Error) -> Self {
        ReadError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl ReadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadError::MissingVoice
            | ReadError::EmptySegment
            | ReadError::InvalidSpeed(_)
            | ReadError::Config(_) => ErrorKind::Validation,
            ReadError::Transport { .. } | ReadError::EmptyAudio | ReadError::Io(_) => {
                ErrorKind::Transport
            }
            ReadError::Synthesis(_) => ErrorKind::Synthesis,
            ReadError::Playback(_) => ErrorKind::Playback,
        }
    }
}

/// Coarse error category reported to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Synthesis,
    Playback,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Synthesis => "synthesis",
            ErrorKind::Playback => "playback",
        };
        f.write_str(name)
    }
}
