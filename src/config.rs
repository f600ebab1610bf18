use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::lexical::DEFAULT_COMPLEXITY_THRESHOLD;
use crate::ReadingMode;

/// Playback rates outside this range are clamped before reaching the audio backend.
pub const MIN_PLAYBACK_RATE: f32 = 0.25;
pub const MAX_PLAYBACK_RATE: f32 = 4.0;

/// Timing constants for one reading mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    /// Delay before the first word is highlighted, letting audio output begin.
    pub initial_delay_ms: u64,
    /// Share of the audio duration spread across the words by the budget strategy.
    pub budget_fraction: f64,
    /// Lower bound of the per-word budget base.
    pub budget_floor_ms: f64,
    /// Absolute minimum of a budgeted word duration.
    pub budget_min_ms: f64,
    /// Base of the lexical strategy.
    pub lexical_base_ms: f64,
    /// Added per (cleaned) character by the lexical strategy.
    pub lexical_per_char_ms: f64,
    /// Absolute minimum of a lexical word duration.
    pub lexical_min_ms: f64,
    /// Extra pause after a word ending a clause or sentence.
    pub punctuation_pause_ms: f64,
    pub complex_word_factor: f64,
    pub sight_word_factor: f64,
}

impl ModeProfile {
    /// Pacing close to natural speech.
    pub fn normal() -> Self {
        Self {
            initial_delay_ms: 500,
            budget_fraction: 0.7,
            budget_floor_ms: 1000.0,
            budget_min_ms: 800.0,
            lexical_base_ms: 200.0,
            lexical_per_char_ms: 40.0,
            lexical_min_ms: 300.0,
            punctuation_pause_ms: 100.0,
            complex_word_factor: 1.0,
            sight_word_factor: 1.0,
        }
    }

    /// Slower pacing that gives complex words extra time.
    pub fn learning() -> Self {
        Self {
            initial_delay_ms: 800,
            budget_fraction: 0.5,
            budget_floor_ms: 1800.0,
            budget_min_ms: 1500.0,
            lexical_base_ms: 700.0,
            lexical_per_char_ms: 120.0,
            lexical_min_ms: 300.0,
            punctuation_pause_ms: 200.0,
            complex_word_factor: 1.8,
            sight_word_factor: 0.9,
        }
    }
}

impl Default for ModeProfile {
    fn default() -> Self {
        Self::normal()
    }
}

/// Configuration of the read-aloud engine.
///
/// Build one with [`EngineConfigBuilder`] or load it from JSON with
/// [`EngineConfig::from_json_file`]; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, build_fn(validate = "Self::check"))]
#[serde(default)]
pub struct EngineConfig {
    pub normal: ModeProfile,
    pub learning: ModeProfile,
    /// Position sampling period, one animation frame.
    pub frame_interval_ms: u64,
    /// How long position mode tolerates an unchanged word index before resampling.
    pub stall_threshold_ms: u64,
    /// Allow the position-driven scheduler when the audio reports its duration.
    pub position_sampling: bool,
    /// Client-side multiplier applied on top of the server-reported playback rate.
    pub client_rate_multiplier: f32,
    /// Words longer than this many characters are complex.
    pub complexity_length_threshold: usize,
    /// Capacity of the reader event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            normal: ModeProfile::normal(),
            learning: ModeProfile::learning(),
            frame_interval_ms: 16,
            stall_threshold_ms: 1000,
            position_sampling: true,
            client_rate_multiplier: 1.0,
            complexity_length_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
            event_capacity: 64,
        }
    }
}

impl EngineConfigBuilder {
    fn check(&self) -> Result<(), String> {
        let config = EngineConfig {
            normal: self.normal.clone().unwrap_or_else(ModeProfile::normal),
            learning: self.learning.clone().unwrap_or_else(ModeProfile::learning),
            ..EngineConfig::default()
        };
        config.validate_profiles()?;
        match self.client_rate_multiplier {
            Some(rate) if !(rate > 0.0 && rate.is_finite()) => {
                Err(format!("client_rate_multiplier must be positive, got {rate}"))
            }
            _ => Ok(()),
        }?;
        match self.frame_interval_ms {
            Some(0) => Err("frame_interval_ms must be non-zero".to_string()),
            _ => Ok(()),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ReadError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| ReadError::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn profile(&self, mode: ReadingMode) -> &ModeProfile {
        match mode {
            ReadingMode::Normal => &self.normal,
            ReadingMode::Learning => &self.learning,
        }
    }

    /// Compose the server-reported rate with the client multiplier.
    pub fn effective_playback_rate(&self, server_rate: f32) -> f32 {
        let rate = server_rate * self.client_rate_multiplier;
        if !rate.is_finite() || rate <= 0.0 {
            return 1.0;
        }
        rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    }

    pub fn validate(&self) -> Result<(), ReadError> {
        self.validate_profiles().map_err(ReadError::Config)?;
        if !(self.client_rate_multiplier > 0.0 && self.client_rate_multiplier.is_finite()) {
            return Err(ReadError::Config(format!(
                "client_rate_multiplier must be positive, got {}",
                self.client_rate_multiplier
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(ReadError::Config("frame_interval_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    fn validate_profiles(&self) -> Result<(), String> {
        for (name, p) in [("normal", &self.normal), ("learning", &self.learning)] {
            if !(p.budget_fraction > 0.0 && p.budget_fraction <= 1.0) {
                return Err(format!(
                    "{name}.budget_fraction must be in (0, 1], got {}",
                    p.budget_fraction
                ));
            }
            if p.lexical_min_ms <= 0.0 || p.budget_min_ms <= 0.0 {
                return Err(format!("{name} minimum durations must be positive"));
            }
        }

        // Learning mode may never pace faster than normal mode.
        let (n, l) = (&self.normal, &self.learning);
        let slower = l.budget_floor_ms * l.sight_word_factor.min(1.0) >= n.budget_floor_ms
            && l.budget_min_ms >= n.budget_min_ms
            && l.sight_word_factor.min(1.0) / l.budget_fraction >= 1.0 / n.budget_fraction
            && l.lexical_base_ms * l.sight_word_factor.min(1.0) >= n.lexical_base_ms
            && l.lexical_per_char_ms * l.sight_word_factor.min(1.0) >= n.lexical_per_char_ms
            && l.lexical_min_ms >= n.lexical_min_ms
            && l.punctuation_pause_ms >= n.punctuation_pause_ms
            && l.complex_word_factor >= n.complex_word_factor.max(1.0)
            && n.sight_word_factor <= 1.0
            && n.complex_word_factor <= 1.0;
        if !slower {
            return Err("learning profile must not be faster than the normal profile".to_string());
        }
        Ok(())
    }
}
