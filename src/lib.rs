//! # read-aloud
//!
//! A read-along playback engine: it asks a speech service to synthesize a
//! segment of story text, plays the returned audio and highlights each word
//! in step with the voice.
//!
//! The service does not return per-word timestamps, so word timing is
//! estimated from coarse signals (audio duration, word count, word length,
//! lexical category, playback rate) and corrected against the actual playback
//! position whenever the audio reports one.
//!
//! ## Features
//!
//! - **Two reading modes**: `normal` paces close to natural speech, `learning`
//!   slows down and gives hard words more time
//! - **Three timing strategies**: position sampling, duration budget and
//!   lexical estimation, picked automatically per read (see [`timing::TimingStrategy`])
//! - **Supersession**: starting a new read tears the previous one down first
//! - **Pluggable collaborators**: speech service, audio output and highlight
//!   surface are traits; HTTP and headless implementations are included
//!
//! The HTTP speech client needs the `http` feature, which is on by default:
//!
//! - `http` - [`synthesis::SpeechSynthesizer`] and voice listing over reqwest
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! read-aloud = "2026.10"
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use read_aloud::{
//!     orchestrator::ReadAloudOrchestrator, playback::HeadlessBackend,
//!     synthesis::http::HttpSpeechClient, EngineConfig, ReadingMode, ReadRequestBuilder,
//! };
//!
//! let orchestrator = ReadAloudOrchestrator::new(
//!     Arc::new(HttpSpeechClient::new("http://localhost:5000")?),
//!     Arc::new(HeadlessBackend::default()),
//!     Arc::new(my_highlight_surface),
//!     EngineConfig::default(),
//! )?;
//! let mut events = orchestrator.subscribe();
//!
//! let request = ReadRequestBuilder::default()
//!     .segment_id("stanza-0")
//!     .words(read_aloud::words_from_text("The cat sat on the mat."))
//!     .voice_id("voice-1")
//!     .mode(ReadingMode::Learning)
//!     .build()?;
//! orchestrator.submit_read_request(request);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod lexical;
pub mod orchestrator;
pub mod playback;
pub mod scheduler;
pub mod segment;
pub mod synthesis;
pub mod timing;

use std::fmt;
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

pub use config::{EngineConfig, EngineConfigBuilder, ModeProfile};
pub use error::{ErrorKind, PlaybackError, ReadError};
pub use lexical::{classify, WordCategory};

/// Reading pace selected by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Normal,
    Learning,
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Normal => "normal",
            ReadingMode::Learning => "learning",
        }
    }
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ReadingMode::Normal),
            "learning" => Ok(ReadingMode::Learning),
            other => Err(format!("unknown reading mode: {other:?}")),
        }
    }
}

/// Opaque identifier of the UI region a segment is shown in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SegmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One spoken token of a segment, the unit of highlighting.
///
/// The category is computed once at construction; a `WordUnit` never changes
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordUnit {
    /// Display form, punctuation included.
    pub text: String,
    /// 0-based position in the segment.
    pub index: usize,
    pub category: WordCategory,
}

impl WordUnit {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let category = classify(&text);
        Self {
            text,
            index,
            category,
        }
    }

    /// Build a word using a non-default complexity threshold.
    pub fn with_threshold(index: usize, text: impl Into<String>, threshold: usize) -> Self {
        let text = text.into();
        let category = lexical::classify_with_threshold(&text, threshold);
        Self {
            text,
            index,
            category,
        }
    }

    /// Number of alphanumeric characters, the length timing works with.
    pub fn letter_count(&self) -> usize {
        self.text.chars().filter(|c| c.is_alphanumeric()).count()
    }

    /// True when the word closes a clause or sentence.
    pub fn ends_clause(&self) -> bool {
        self.text
            .trim_end_matches(['"', '\'', ')', '\u{201d}'])
            .ends_with(['.', ',', '!', '?', ';', ':'])
    }
}

/// Split text on whitespace into indexed, classified words.
pub fn words_from_text(text: &str) -> Vec<WordUnit> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| WordUnit::new(index, word))
        .collect()
}

/// A user-initiated "read this segment aloud" action.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct ReadRequest {
    pub segment_id: SegmentId,
    /// Words in reading order.
    pub words: Vec<WordUnit>,
    #[builder(default)]
    pub mode: ReadingMode,
    pub voice_id: String,
    #[builder(default = "1.0")]
    pub speed_multiplier: f64,
}

impl ReadRequest {
    /// Text sent to the speech service.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Check the request before any network call is made.
    pub fn validate(&self) -> Result<(), ReadError> {
        if self.voice_id.trim().is_empty() {
            return Err(ReadError::MissingVoice);
        }
        if self.words.is_empty() {
            return Err(ReadError::EmptySegment);
        }
        if !(self.speed_multiplier > 0.0 && self.speed_multiplier.is_finite()) {
            return Err(ReadError::InvalidSpeed(self.speed_multiplier));
        }
        Ok(())
    }
}
