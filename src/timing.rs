//! Per-word highlight timing.
//!
//! The speech service returns no word timestamps, so highlight timing is an
//! estimate. Three strategies exist and one is picked per read by
//! [`TimingStrategy::select`]:
//!
//! | Strategy | When | Word timing |
//! |---|---|---|
//! | [`TimingStrategy::PositionSampled`] | duration known, player reports position | `floor(position / (duration / (words + 1)))` |
//! | [`TimingStrategy::TimedBudget`] | duration known, no position | a share of the audio duration per word, lexically adjusted |
//! | [`TimingStrategy::TimedLexical`] | duration unknown | base + per-character time, lexically adjusted |
//!
//! The budget strategy deliberately spreads only a fraction of the duration
//! over the words (70 % normal, 50 % learning). Synthesized speech has uneven
//! pacing and a full allocation drifts ahead of or behind the voice.
//!
//! For any word and equal speed, learning mode is never faster than normal
//! mode; [`crate::EngineConfig::validate`] rejects profiles that would break this.

use crate::config::{EngineConfig, ModeProfile};
use crate::{ReadingMode, WordCategory, WordUnit};

/// How highlight progress is driven for one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingStrategy {
    /// Sample the playback position every frame and map it to a word.
    PositionSampled,
    /// Fixed-advance timer, each word's delay budgeted from the audio duration.
    TimedBudget,
    /// Fixed-advance timer, each word's delay estimated from its letters alone.
    TimedLexical,
}

impl TimingStrategy {
    /// Pick the strategy for a read.
    ///
    /// Position sampling is preferred whenever the duration is known before
    /// the first tick; the timers are fallbacks.
    pub fn select(
        duration_ms: Option<f64>,
        position_available: bool,
        position_sampling_enabled: bool,
    ) -> Self {
        match duration_ms.filter(|d| d.is_finite() && *d > 0.0) {
            Some(_) if position_available && position_sampling_enabled => {
                TimingStrategy::PositionSampled
            }
            Some(_) => TimingStrategy::TimedBudget,
            None => TimingStrategy::TimedLexical,
        }
    }

    pub fn is_timer_driven(&self) -> bool {
        !matches!(self, TimingStrategy::PositionSampled)
    }
}

/// Pure word-duration computation over an [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct TimingModel {
    config: EngineConfig,
}

impl TimingModel {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Highlight duration of `word`, in milliseconds.
    ///
    /// `audio_duration_ms` is the wall-clock length of the audio when known;
    /// with it the budget strategy is used, without it the lexical one.
    pub fn duration_ms(
        &self,
        word: &WordUnit,
        mode: ReadingMode,
        total_words: usize,
        audio_duration_ms: Option<f64>,
        speed_multiplier: f64,
    ) -> f64 {
        let profile = self.config.profile(mode);
        let speed = if speed_multiplier.is_finite() && speed_multiplier > 0.0 {
            speed_multiplier
        } else {
            1.0
        };

        match audio_duration_ms.filter(|d| d.is_finite() && *d > 0.0) {
            Some(duration) => budget_duration(profile, word, total_words, duration, speed),
            None => lexical_duration(profile, word, speed),
        }
    }

    /// Wait before the first word is lit in timer-driven modes.
    pub fn initial_delay_ms(&self, mode: ReadingMode) -> u64 {
        self.config.profile(mode).initial_delay_ms
    }
}

fn budget_duration(
    profile: &ModeProfile,
    word: &WordUnit,
    total_words: usize,
    audio_duration_ms: f64,
    speed: f64,
) -> f64 {
    let share = audio_duration_ms / (total_words.max(1) as f64 * profile.budget_fraction);
    let base = share.max(profile.budget_floor_ms);

    let adjusted = base * length_factor(word.letter_count()) * category_factor(profile, word)
        + punctuation_pause(profile, word);

    (adjusted / speed).max(profile.budget_min_ms)
}

fn lexical_duration(profile: &ModeProfile, word: &WordUnit, speed: f64) -> f64 {
    let letters = word.letter_count();
    let base = profile.lexical_base_ms + profile.lexical_per_char_ms * letters as f64;

    let adjusted = base * length_factor(letters) * category_factor(profile, word)
        + punctuation_pause(profile, word);

    (adjusted / speed).max(profile.lexical_min_ms)
}

/// Length bands. Ambiguous bands round toward slower.
fn length_factor(letters: usize) -> f64 {
    match letters {
        n if n > 8 => 1.6,
        n if n > 5 => 1.3,
        n if n <= 3 => 0.85,
        _ => 1.0,
    }
}

fn category_factor(profile: &ModeProfile, word: &WordUnit) -> f64 {
    match word.category {
        WordCategory::Complex => profile.complex_word_factor,
        WordCategory::Sight => profile.sight_word_factor,
        WordCategory::Phonics | WordCategory::Regular => 1.0,
    }
}

fn punctuation_pause(profile: &ModeProfile, word: &WordUnit) -> f64 {
    if word.ends_clause() {
        profile.punctuation_pause_ms
    } else {
        0.0
    }
}

/// Map a playback position to the word that should be highlighted.
///
/// The audio is cut into `total_words + 1` equal slots; the trailing slot
/// absorbs the silence after the last word. A result equal to `total_words`
/// means every word has been read.
pub fn index_for_position(position_ms: f64, duration_ms: f64, total_words: usize) -> usize {
    if total_words == 0 || !(duration_ms > 0.0) || !position_ms.is_finite() {
        return 0;
    }
    let slot = duration_ms / (total_words + 1) as f64;
    let index = (position_ms.max(0.0) / slot).floor() as usize;
    index.min(total_words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words_from_text;

    const SAMPLE: &str = "The cat jumped over a wonderful, extraordinary rainbow!";

    fn model() -> TimingModel {
        TimingModel::new(EngineConfig::default())
    }

    #[test]
    fn learning_is_never_faster_than_normal() {
        let model = model();
        let words = words_from_text(SAMPLE);
        for word in &words {
            for audio in [None, Some(500.0), Some(3000.0), Some(60_000.0)] {
                for speed in [0.5, 1.0, 2.0, 4.0] {
                    let normal =
                        model.duration_ms(word, ReadingMode::Normal, words.len(), audio, speed);
                    let learning =
                        model.duration_ms(word, ReadingMode::Learning, words.len(), audio, speed);
                    assert!(
                        learning >= normal,
                        "{:?} audio={audio:?} speed={speed}: {learning} < {normal}",
                        word.text
                    );
                }
            }
        }
    }

    #[test]
    fn durations_never_drop_below_mode_floor() {
        let model = model();
        let words = words_from_text(SAMPLE);
        for word in &words {
            for speed in [1.0, 8.0, 100.0] {
                let budget =
                    model.duration_ms(word, ReadingMode::Normal, 1000, Some(1.0), speed);
                assert!(budget >= 800.0);
                let budget =
                    model.duration_ms(word, ReadingMode::Learning, 1000, Some(1.0), speed);
                assert!(budget >= 1500.0);
                let lexical = model.duration_ms(word, ReadingMode::Normal, 8, None, speed);
                assert!(lexical >= 300.0);
            }
        }
    }

    #[test]
    fn doubling_speed_halves_duration_above_the_floor() {
        let model = model();
        let word = WordUnit::new(0, "wonderful");
        let slow = model.duration_ms(&word, ReadingMode::Learning, 4, Some(20_000.0), 1.0);
        let fast = model.duration_ms(&word, ReadingMode::Learning, 4, Some(20_000.0), 2.0);
        assert!((slow / fast - 2.0).abs() < 1e-9, "{slow} vs {fast}");

        let slow = model.duration_ms(&word, ReadingMode::Learning, 4, None, 1.0);
        let fast = model.duration_ms(&word, ReadingMode::Learning, 4, None, 2.0);
        assert!((slow / fast - 2.0).abs() < 1e-9, "{slow} vs {fast}");
    }

    #[test]
    fn budget_uses_a_fraction_of_the_audio() {
        let model = model();
        // "pond": regular, four letters, no length or category adjustment
        let word = WordUnit::new(0, "pond");
        let normal = model.duration_ms(&word, ReadingMode::Normal, 10, Some(14_000.0), 1.0);
        assert!((normal - 2000.0).abs() < 1e-9, "{normal}");
        let learning = model.duration_ms(&word, ReadingMode::Learning, 10, Some(14_000.0), 1.0);
        assert!((learning - 2800.0).abs() < 1e-9, "{learning}");
    }

    #[test]
    fn budget_base_has_a_floor_for_long_segments() {
        let model = model();
        let word = WordUnit::new(0, "pond");
        let normal = model.duration_ms(&word, ReadingMode::Normal, 500, Some(10_000.0), 1.0);
        assert_eq!(normal, 1000.0);
        let learning = model.duration_ms(&word, ReadingMode::Learning, 500, Some(10_000.0), 1.0);
        assert_eq!(learning, 1800.0);
    }

    #[test]
    fn lexical_estimate_without_duration() {
        let model = model();
        // 200 + 4 * 40
        let word = WordUnit::new(0, "pond");
        assert_eq!(model.duration_ms(&word, ReadingMode::Normal, 3, None, 1.0), 360.0);
        // (700 + 9 * 120) * 1.6 long * 1.8 complex
        let word = WordUnit::new(0, "wonderful");
        let learning = model.duration_ms(&word, ReadingMode::Learning, 3, None, 1.0);
        assert!((learning - 5126.4).abs() < 1e-6, "{learning}");
    }

    #[test]
    fn punctuation_adds_a_pause() {
        let model = model();
        let plain = model.duration_ms(&WordUnit::new(0, "pond"), ReadingMode::Normal, 3, None, 1.0);
        let end = model.duration_ms(&WordUnit::new(0, "pond."), ReadingMode::Normal, 3, None, 1.0);
        assert_eq!(end - plain, 100.0);
    }

    #[test]
    fn nonsense_speed_falls_back_to_one() {
        let model = model();
        let word = WordUnit::new(0, "pond");
        let one = model.duration_ms(&word, ReadingMode::Normal, 3, None, 1.0);
        assert_eq!(model.duration_ms(&word, ReadingMode::Normal, 3, None, 0.0), one);
        assert_eq!(model.duration_ms(&word, ReadingMode::Normal, 3, None, f64::NAN), one);
    }

    #[test]
    fn three_words_over_three_seconds_map_to_quarter_slots() {
        let at = |ms: f64| index_for_position(ms, 3000.0, 3);
        assert_eq!(at(0.0), 0);
        assert_eq!(at(749.9), 0);
        assert_eq!(at(750.0), 1);
        assert_eq!(at(1499.0), 1);
        assert_eq!(at(1500.0), 2);
        assert_eq!(at(2249.0), 2);
        assert_eq!(at(2250.0), 3);
        assert_eq!(at(10_000.0), 3);
    }

    #[test]
    fn position_mapping_tolerates_bad_input() {
        assert_eq!(index_for_position(-50.0, 3000.0, 3), 0);
        assert_eq!(index_for_position(100.0, 0.0, 3), 0);
        assert_eq!(index_for_position(100.0, 3000.0, 0), 0);
        assert_eq!(index_for_position(f64::NAN, 3000.0, 3), 0);
    }

    #[test]
    fn strategy_prefers_position_sampling() {
        assert_eq!(
            TimingStrategy::select(Some(3000.0), true, true),
            TimingStrategy::PositionSampled
        );
        assert_eq!(
            TimingStrategy::select(Some(3000.0), false, true),
            TimingStrategy::TimedBudget
        );
        assert_eq!(
            TimingStrategy::select(Some(3000.0), true, false),
            TimingStrategy::TimedBudget
        );
        assert_eq!(TimingStrategy::select(None, true, true), TimingStrategy::TimedLexical);
        assert_eq!(
            TimingStrategy::select(Some(f64::INFINITY), true, true),
            TimingStrategy::TimedLexical
        );
    }
}
