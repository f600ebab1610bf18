//! Lexical classification of words for early readers.
//!
//! Every word falls into exactly one [`WordCategory`]. Rules are checked in
//! precedence order and the first match wins:
//!
//! 1. membership in the fixed sight-word list → [`WordCategory::Sight`]
//! 2. a three-letter consonant/vowel/consonant word → [`WordCategory::Phonics`]
//! 3. longer than the complexity threshold, a vowel run (≥2), a consonant run
//!    (≥3) or a digraph/cluster such as `ph` or `tch` → [`WordCategory::Complex`]
//! 4. anything else → [`WordCategory::Regular`]
//!
//! Matching is case-insensitive and ignores every non-alphanumeric character,
//! so `"The,"` and `"the"` classify identically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default length above which a word counts as complex.
pub const DEFAULT_COMPLEXITY_THRESHOLD: usize = 6;

/// Early-reader sight words, already lowercase.
pub const SIGHT_WORDS: &[&str] = &[
    "a", "all", "am", "and", "are", "at", "away", "big", "blue", "can", "come", "down", "find",
    "for", "funny", "go", "help", "here", "i", "in", "is", "it", "jump", "little", "look", "make",
    "me", "my", "not", "one", "play", "red", "run", "said", "see", "the", "three", "to", "two",
    "up", "we", "where", "yellow", "you", "on", "he", "she", "was", "of", "they", "be",
    "do", "no", "so", "by",
];

const CLUSTERS: &[&str] = &["ph", "gh", "th", "wh", "qu", "sc", "ck", "dge", "tch", "sch"];

/// Reading category of a single word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordCategory {
    #[serde(rename = "sight-word")]
    Sight,
    #[serde(rename = "phonics-word")]
    Phonics,
    #[serde(rename = "complex-word", alias = "vocabulary-word")]
    Complex,
    #[serde(rename = "regular-word")]
    Regular,
}

impl WordCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordCategory::Sight => "sight-word",
            WordCategory::Phonics => "phonics-word",
            WordCategory::Complex => "complex-word",
            WordCategory::Regular => "regular-word",
        }
    }
}

impl fmt::Display for WordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WordCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sight-word" => Ok(WordCategory::Sight),
            "phonics-word" => Ok(WordCategory::Phonics),
            "complex-word" | "vocabulary-word" => Ok(WordCategory::Complex),
            "regular-word" => Ok(WordCategory::Regular),
            other => Err(format!("unknown word category: {other:?}")),
        }
    }
}

/// Lowercase a word and drop everything that is not alphanumeric.
pub fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Classify a word using the default complexity threshold.
pub fn classify(word: &str) -> WordCategory {
    classify_with_threshold(word, DEFAULT_COMPLEXITY_THRESHOLD)
}

/// Classify a word, treating anything longer than `threshold` characters as complex.
pub fn classify_with_threshold(word: &str, threshold: usize) -> WordCategory {
    let clean = normalize(word);

    if SIGHT_WORDS.contains(&clean.as_str()) {
        return WordCategory::Sight;
    }

    if is_cvc(&clean) {
        return WordCategory::Phonics;
    }

    if clean.chars().count() > threshold
        || longest_run(&clean, is_vowel) >= 2
        || longest_run(&clean, is_consonant) >= 3
        || CLUSTERS.iter().any(|cluster| clean.contains(cluster))
    {
        return WordCategory::Complex;
    }

    WordCategory::Regular
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_lowercase() && !is_vowel(c)
}

fn is_cvc(clean: &str) -> bool {
    let chars: Vec<char> = clean.chars().collect();
    matches!(
        chars.as_slice(),
        [a, b, c] if is_consonant(*a) && is_vowel(*b) && is_consonant(*c)
    )
}

fn longest_run(clean: &str, pred: fn(char) -> bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for c in clean.chars() {
        if pred(c) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
