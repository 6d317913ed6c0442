//! Pluggable title similarity.
//!
//! The matcher scores titles through the [`Similarity`] trait so the
//! scoring algorithm can change without touching match semantics. Every
//! implementation normalizes both inputs first (lowercase, whitespace
//! collapsed) and returns a score in `[0, 1]`.

use std::str::FromStr;

use serde::Serialize;

/// A normalized string similarity score in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// Short algorithm name for logs.
    fn name(&self) -> &'static str;
}

/// Lowercase and collapse runs of whitespace to single spaces.
#[must_use]
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-sort ratio: whitespace-separated tokens of the normalized title
/// sorted alphabetically, then an indel ratio `2 * LCS / (|a| + |b|)` over
/// the characters.
///
/// Word order does not matter ("Guide Setup" == "Setup Guide") but every
/// edited character costs, punctuation included, so near-identical titles
/// stay close without reaching 1.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSortRatio;

impl TokenSortRatio {
    fn sorted_tokens(s: &str) -> Vec<char> {
        let normalized = normalize(s);
        let mut tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
        tokens.sort_unstable();
        tokens.join(" ").chars().collect()
    }
}

impl Similarity for TokenSortRatio {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = Self::sorted_tokens(a);
        let b = Self::sorted_tokens(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        let lcs = lcs_len(&a, &b);
        #[allow(clippy::cast_precision_loss)]
        let score = (2 * lcs) as f64 / (a.len() + b.len()) as f64;
        score
    }

    fn name(&self) -> &'static str {
        "token_sort_ratio"
    }
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        scored(a, b, |a, b| strsim::jaro_winkler(a, b))
    }

    fn name(&self) -> &'static str {
        "jaro_winkler"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        scored(a, b, strsim::normalized_levenshtein)
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SorensenDice;

impl Similarity for SorensenDice {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        scored(a, b, strsim::sorensen_dice)
    }

    fn name(&self) -> &'static str {
        "sorensen_dice"
    }
}

/// Normalize, reject blanks, and clamp.
fn scored(a: &str, b: &str, f: impl Fn(&str, &str) -> f64) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    f(&a, &b).clamp(0.0, 1.0)
}

/// Algorithm selector for configuration and the CLI.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    TokenSort,
    JaroWinkler,
    Levenshtein,
    SorensenDice,
}

impl SimilarityKind {
    #[must_use]
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            Self::TokenSort => Box::new(TokenSortRatio),
            Self::JaroWinkler => Box::new(JaroWinkler),
            Self::Levenshtein => Box::new(NormalizedLevenshtein),
            Self::SorensenDice => Box::new(SorensenDice),
        }
    }
}

impl FromStr for SimilarityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "token_sort" | "token_sort_ratio" => Ok(Self::TokenSort),
            "jaro_winkler" => Ok(Self::JaroWinkler),
            "levenshtein" => Ok(Self::Levenshtein),
            "sorensen_dice" | "dice" => Ok(Self::SorensenDice),
            other => Err(format!(
                "unknown similarity '{other}' (expected token_sort, jaro_winkler, levenshtein or sorensen_dice)"
            )),
        }
    }
}
