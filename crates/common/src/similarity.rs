//! Agreement scores between an expected and an actual answer
//!
//! Two independent strategies:
//!
//! - **Lexical**: fraction of normalized expected keywords contained in the
//!   normalized actual text. Containment is checked one way only (expected
//!   into actual) and by substring, not token boundary.
//! - **Semantic**: cosine similarity of embedding vectors produced by an
//!   [`Embedder`].
//!
//! Both are pure and hold no mutable state, so a scorer can be shared by any
//! number of workers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::embedding::{EmbedError, Embedder};

/// Semantic scoring failure
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Embedding provider failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Cosine similarity undefined for a zero-magnitude vector")]
    ZeroMagnitude,

    #[error("Embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Which strategy a check uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Lexical,
    #[default]
    Semantic,
}

/// Unicode general category P, plus ASCII symbols such as `$`, `+` and `|`
static PUNCTUATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[\p{P}\x21-\x2F\x3A-\x40\x5B-\x60\x7B-\x7E]").ok());

/// Normalize text for keyword comparison.
///
/// Lowercases, strips combining marks after canonical decomposition (Arabic
/// harakat, Latin accents), turns every punctuation character into a space,
/// collapses whitespace runs and trims. Idempotent.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let spaced = match PUNCTUATION.as_ref() {
        Some(re) => re.replace_all(&stripped, " "),
        None => Cow::Owned(stripped.replace(|c: char| c.is_ascii_punctuation(), " ")),
    };

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keyword overlap, or `None` when there is nothing meaningful to compare
fn keyword_overlap(expected: &str, actual: &str) -> Option<f64> {
    if expected.is_empty() || actual.is_empty() {
        return None;
    }

    let expected = normalize(expected);
    let actual = normalize(actual);

    let keywords: Vec<&str> = expected.split_whitespace().collect();
    if keywords.is_empty() {
        return None;
    }

    let matched = keywords.iter().filter(|k| actual.contains(**k)).count();
    let score = matched as f64 / keywords.len() as f64;
    debug!(matched, total = keywords.len(), score, "keyword match similarity");
    Some(score)
}

/// Fraction of expected keywords found in `actual`, in `[0, 1]`.
///
/// Returns 0 when either side is empty or `expected` has no keywords after
/// normalization.
pub fn lexical_score(expected: &str, actual: &str) -> f64 {
    keyword_overlap(expected, actual).unwrap_or(0.0)
}

/// Whether the lexical score reaches `threshold`.
///
/// Degenerate input never matches, whatever the threshold.
pub fn lexical_match(expected: &str, actual: &str, threshold: f64) -> bool {
    keyword_overlap(expected, actual).is_some_and(|score| score >= threshold)
}

/// `dot(a, b) / (|a| * |b|)`, in `[-1, 1]`.
///
/// Errors on a zero-magnitude vector or mismatched lengths instead of
/// inventing a score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, ScoreError> {
    if a.len() != b.len() {
        return Err(ScoreError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(ScoreError::ZeroMagnitude);
    }

    Ok((dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0))
}

/// Cosine similarity of the embeddings of `text1` and `text2`
pub fn semantic_score(
    embedder: &dyn Embedder,
    text1: &str,
    text2: &str,
) -> Result<f64, ScoreError> {
    let v1 = embedder.embed(text1)?;
    let v2 = embedder.embed(text2)?;
    let score = cosine_similarity(&v1, &v2)?;
    debug!(score, "semantic similarity");
    Ok(score)
}

/// Cosine similarity over embeddings from an external provider
#[derive(Clone)]
pub struct SemanticScorer {
    embedder: Arc<dyn Embedder>,
}

impl SemanticScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embed both texts and compare them. Provider failures propagate.
    pub fn score(&self, text1: &str, text2: &str) -> Result<f64, ScoreError> {
        semantic_score(&*self.embedder, text1, text2)
    }

    pub fn matches(&self, text1: &str, text2: &str, threshold: f64) -> Result<bool, ScoreError> {
        Ok(self.score(text1, text2)? >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use test_case::test_case;

    #[test_case("Abu Dhabi is the capital", "The capital of the UAE is Abu Dhabi." ; "reordered sentence")]
    #[test_case("capital", "CAPITAL!!!" ; "case and punctuation")]
    #[test_case("emirates id", "Renew your Emirates ID online" ; "inside longer answer")]
    fn test_fully_contained_scores_one(expected: &str, actual: &str) {
        assert_eq!(lexical_score(expected, actual), 1.0);
    }

    #[test]
    fn test_disjoint_scores_zero() {
        assert_eq!(lexical_score("visa renewal", "opening hours"), 0.0);
    }

    #[test]
    fn test_lexical_is_asymmetric() {
        assert_eq!(lexical_score("cat dog", "dog"), 0.5);
        assert_eq!(lexical_score("dog", "cat dog"), 1.0);
    }

    #[test]
    fn test_substring_not_token_match() {
        // "cap" is not a word of the answer but is contained in "capital".
        assert_eq!(lexical_score("cap", "the capital"), 1.0);
    }

    #[test_case("", "anything" ; "empty expected")]
    #[test_case("anything", "" ; "empty actual")]
    #[test_case("?!...", "anything" ; "punctuation only expected")]
    #[test_case("   ", "anything" ; "blank expected")]
    fn test_degenerate_inputs_score_zero(expected: &str, actual: &str) {
        assert_eq!(lexical_score(expected, actual), 0.0);
        assert!(!lexical_match(expected, actual, 0.0));
    }

    #[test]
    fn test_capital_scenario_passes_threshold() {
        assert!(lexical_match(
            "Abu Dhabi is the capital",
            "The capital of the UAE is Abu Dhabi.",
            0.6
        ));
    }

    #[test]
    fn test_arabic_diacritics_neutralized() {
        // "مَرْحَبًا" with harakat vs. the bare letters
        assert_eq!(normalize("مَرْحَبًا"), normalize("مرحبا"));
        assert_eq!(lexical_score("مَرْحَبًا بِكُمْ", "مرحبا بكم في أبوظبي"), 1.0);
    }

    #[test]
    fn test_arabic_punctuation_becomes_space() {
        assert_eq!(normalize("ما هي العاصمة؟"), "ما هي العاصمة");
    }

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize("  Hello,   WORLD!  "), "hello world");
        assert_eq!(normalize("Café\u{2014}crème"), "cafe creme");
        assert_eq!(normalize("step-by-step\n\n## Guide"), "step by step guide");
    }

    #[test_case("Abu Dhabi\u{FF01}", "abu dhabi" ; "fullwidth exclamation")]
    #[test_case("why\u{FF1F}", "why" ; "fullwidth question mark")]
    #[test_case("a\u{FF0C}b", "a b" ; "fullwidth comma")]
    #[test_case("a\u{2E2E}b", "a b" ; "supplemental reversed question mark")]
    #[test_case("a\u{FE50}b", "a b" ; "small comma")]
    #[test_case("a\u{0964}b", "a b" ; "devanagari danda")]
    #[test_case("1+1=2 | x~y ^z", "1 1 2 x y z" ; "ascii symbols")]
    fn test_normalize_unicode_punctuation(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_fullwidth_punctuation_does_not_cost_keywords() {
        assert_eq!(lexical_score("Abu Dhabi\u{FF01}", "Abu Dhabi"), 1.0);
    }

    #[test_case("  Hello,   WORLD!  " ; "ascii")]
    #[test_case("a \u{0301} b" ; "isolated combining mark")]
    #[test_case("İstanbul ΟΔΟΣ." ; "special casing")]
    #[test_case("مَرْحَبًا، بِكُمْ" ; "arabic")]
    #[test_case("…«quoted»…" ; "unicode punctuation")]
    #[test_case("\u{FF01}why\u{FF1F} a\u{2E2E}b\u{FE50}" ; "fullwidth and supplemental punctuation")]
    #[test_case("" ; "empty")]
    fn test_normalize_is_idempotent(input: &str) {
        let once = normalize(input);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let v = [0.3f32, -1.2, 4.5, 0.0, 2.25];
        assert_eq!(cosine_similarity(&v, &v).unwrap(), 1.0);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = [0.1f32, 0.7, -0.3];
        let b = [0.9f32, -0.2, 0.4];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_cosine_opposite_and_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]).unwrap(), -1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_zero_magnitude_is_error() {
        assert!(matches!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]),
            Err(ScoreError::ZeroMagnitude)
        ));
    }

    #[test]
    fn test_cosine_dimension_mismatch_is_error() {
        assert!(matches!(
            cosine_similarity(&[1.0], &[1.0, 0.0]),
            Err(ScoreError::DimensionMismatch { left: 1, right: 2 })
        ));
    }

    fn hashing_scorer() -> SemanticScorer {
        SemanticScorer::new(Arc::new(HashingEmbedder::new(256)))
    }

    #[test]
    fn test_semantic_identical_text_is_one() {
        let scorer = hashing_scorer();
        let text = "You can renew your Emirates ID through the ICP portal";
        assert_eq!(scorer.score(text, text).unwrap(), 1.0);
    }

    #[test]
    fn test_semantic_symmetric() {
        let scorer = hashing_scorer();
        let a = "Abu Dhabi is the capital";
        let b = "The capital of the UAE is Abu Dhabi";
        assert_eq!(scorer.score(a, b).unwrap(), scorer.score(b, a).unwrap());
    }

    #[test]
    fn test_semantic_empty_text_is_error() {
        let scorer = hashing_scorer();
        assert!(matches!(
            scorer.score("", "something"),
            Err(ScoreError::ZeroMagnitude)
        ));
    }

    struct Unavailable;

    impl Embedder for Unavailable {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Unavailable("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_provider_failure_propagates() {
        let scorer = SemanticScorer::new(Arc::new(Unavailable));
        let err = scorer.matches("a", "b", 0.5).unwrap_err();
        assert!(matches!(err, ScoreError::Embedding(EmbedError::Unavailable(_))));
    }
}
