//! Story text to readable segments.
//!
//! A story is split into stanzas on blank lines; each stanza becomes a
//! [`Segment`] whose words are the unit of highlighting. Stories stored with
//! escaped newlines (`\n` as two characters) are accepted too.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lexical::DEFAULT_COMPLEXITY_THRESHOLD;
use crate::{ReadRequest, ReadingMode, SegmentId, WordCategory, WordUnit};

/// One stanza of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    /// Position of the stanza in the story.
    pub index: usize,
    pub lines: Vec<String>,
    pub words: Vec<WordUnit>,
}

impl Segment {
    fn from_lines(index: usize, lines: Vec<String>, threshold: usize) -> Self {
        let words = lines
            .iter()
            .flat_map(|line| line.split_whitespace())
            .enumerate()
            .map(|(i, text)| WordUnit::with_threshold(i, text, threshold))
            .collect();
        Self {
            id: SegmentId::new(format!("stanza-{index}")),
            index,
            lines,
            words,
        }
    }

    /// The words joined by single spaces, as sent for synthesis.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn analysis(&self) -> SegmentAnalysis {
        SegmentAnalysis::of(&self.words)
    }

    pub fn read_request(
        &self,
        voice_id: impl Into<String>,
        mode: ReadingMode,
        speed_multiplier: f64,
    ) -> ReadRequest {
        ReadRequest {
            segment_id: self.id.clone(),
            words: self.words.clone(),
            mode,
            voice_id: voice_id.into(),
            speed_multiplier,
        }
    }
}

/// Split story text into stanzas.
///
/// Lines are trimmed; runs of blank lines separate stanzas and never produce
/// empty segments.
pub fn parse_story(text: &str) -> Vec<Segment> {
    parse_story_with_threshold(text, DEFAULT_COMPLEXITY_THRESHOLD)
}

/// [`parse_story`] with a custom complex-word length threshold,
/// usually [`crate::EngineConfig::complexity_length_threshold`].
pub fn parse_story_with_threshold(text: &str, threshold: usize) -> Vec<Segment> {
    let text = text
        .replace("\\\\n", "\n")
        .replace("\\n", "\n")
        .replace("\r\n", "\n");

    let mut segments = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !lines.is_empty() {
                segments.push(Segment::from_lines(
                    segments.len(),
                    std::mem::take(&mut lines),
                    threshold,
                ));
            }
        } else {
            lines.push(line.to_string());
        }
    }
    if !lines.is_empty() {
        segments.push(Segment::from_lines(segments.len(), lines, threshold));
    }

    log::debug!("Parsed story into {} segments", segments.len());
    segments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        })
    }
}

/// Reading difficulty of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAnalysis {
    pub word_count: usize,
    pub sight_words: usize,
    pub phonics_words: usize,
    pub complex_words: usize,
    /// Percentage, rounded to one decimal.
    pub sight_word_ratio: f64,
    pub difficulty: Difficulty,
    pub recommended_reading_mode: ReadingMode,
}

impl SegmentAnalysis {
    pub fn of(words: &[WordUnit]) -> Self {
        let count = |category| words.iter().filter(|w| w.category == category).count();
        let sight_words = count(WordCategory::Sight);
        let phonics_words = count(WordCategory::Phonics);
        let complex_words = count(WordCategory::Complex);

        if words.is_empty() {
            return Self {
                word_count: 0,
                sight_words,
                phonics_words,
                complex_words,
                sight_word_ratio: 0.0,
                difficulty: Difficulty::Easy,
                recommended_reading_mode: ReadingMode::Normal,
            };
        }

        let total = words.len() as f64;
        let sight_ratio = sight_words as f64 / total;
        let complex_ratio = complex_words as f64 / total;

        let difficulty = if complex_ratio > 0.3 {
            Difficulty::Hard
        } else if sight_ratio > 0.7 {
            Difficulty::Easy
        } else {
            Difficulty::Medium
        };
        let recommended_reading_mode = match difficulty {
            Difficulty::Easy => ReadingMode::Normal,
            Difficulty::Medium | Difficulty::Hard => ReadingMode::Learning,
        };

        Self {
            word_count: words.len(),
            sight_words,
            phonics_words,
            complex_words,
            sight_word_ratio: (sight_ratio * 1000.0).round() / 10.0,
            difficulty,
            recommended_reading_mode,
        }
    }
}
