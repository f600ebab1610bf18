//! The speech service seam.
//!
//! Synthesis returns the whole audio payload at once plus a few response
//! attributes; there are no word timestamps. With the `http` feature,
//! `http::HttpSpeechClient` talks to the service over HTTP; tests and offline
//! setups plug in their own [`SpeechSynthesizer`].

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::{ReadRequest, ReadingMode};

/// What is sent to the speech service for one read.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub mode: ReadingMode,
    pub speed_multiplier: f64,
    /// Number of words the client will highlight.
    pub word_count: usize,
}

impl From<&ReadRequest> for SynthesisRequest {
    fn from(request: &ReadRequest) -> Self {
        Self {
            text: request.text(),
            voice_id: request.voice_id.clone(),
            mode: request.mode,
            speed_multiplier: request.speed_multiplier,
            word_count: request.words.len(),
        }
    }
}

/// A speech service response.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSpeech {
    pub audio: Bytes,
    /// Server-chosen playback rate, 1.0 when the service sent none.
    pub playback_rate: f32,
    /// Out-of-band error reported by the service alongside the response.
    pub error: Option<String>,
    /// Word count echoed back by the service.
    pub word_count: Option<usize>,
}

impl SynthesizedSpeech {
    pub fn new(audio: impl Into<Bytes>) -> Self {
        Self {
            audio: audio.into(),
            playback_rate: 1.0,
            error: None,
            word_count: None,
        }
    }

    pub fn with_playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = rate;
        self
    }

    /// A response that only carries the service's error indicator.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(Bytes::new())
        }
    }
}

/// A selectable voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech, ReadError>;
}

#[async_trait]
pub trait VoiceDirectory: Send + Sync {
    /// All voices the service offers. An empty list is a valid answer.
    async fn list_voices(&self) -> Result<Vec<Voice>, ReadError>;
}
