//! Approximate string similarity behind one pluggable contract.
//!
//! Every implementation compares the [`normalize`]d forms of its inputs and
//! returns a ratio in `[0, 1]`, where `1.0` means identical after
//! normalization. Two empty strings are identical; an empty string against a
//! non-empty one scores `0.0`.

use serde::{Deserialize, Serialize};

/// Soft hyphens survive OCR of hyphenated line breaks and never carry meaning.
const SOFT_HYPHEN: char = '\u{ad}';

pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Levenshtein distance scaled by the longer input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistance;

impl Similarity for EditDistance {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        compare_normalized(a, b, strsim::normalized_levenshtein)
    }
}

/// Edit-distance ratio over whitespace tokens sorted alphabetically, so
/// `"Smith John"` and `"John Smith"` are identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSet;

impl Similarity for TokenSet {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        compare_normalized(
            &sorted_tokens(a),
            &sorted_tokens(b),
            strsim::normalized_levenshtein,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        compare_normalized(a, b, strsim::jaro_winkler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    EditDistance,
    TokenSet,
    JaroWinkler,
}

impl SimilarityKind {
    #[must_use]
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            Self::EditDistance => Box::new(EditDistance),
            Self::TokenSet => Box::new(TokenSet),
            Self::JaroWinkler => Box::new(JaroWinkler),
        }
    }
}

/// Case-folded, soft-hyphen-free, whitespace-collapsed form used for comparison.
#[must_use]
pub fn normalize(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Trims and joins whitespace runs with a single space, keeping case.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.replace(SOFT_HYPHEN, ""))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn sorted_tokens(value: &str) -> String {
    let normalized = normalize(value);
    let mut tokens = normalized.split(' ').collect::<Vec<_>>();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn compare_normalized(a: &str, b: &str, ratio: fn(&str, &str) -> f64) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    ratio(&a, &b).clamp(0.0, 1.0)
}
