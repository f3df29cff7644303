//! Pairwise similarity features. Every function here is symmetric in its
//! two arguments, and the vector shape never varies between pairs.

use crate::geo::haversine_m;
use crate::model::{FeatureVector, Record};

/// `address_score` when either side has no address. Neutral on purpose so the
/// vector keeps its shape for training and inference alike.
pub const ADDRESS_FALLBACK_SCORE: f64 = 0.5;

/// Normalized Levenshtein similarity of two normalized names, 1.0 = identical.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Similarity after sorting whitespace tokens, so "12 main st" and
/// "main st 12" score 1.0.
pub fn token_sort_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b)).clamp(0.0, 1.0)
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-sort similarity, or [`ADDRESS_FALLBACK_SCORE`] if either address is
/// missing or blank.
pub fn address_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    fn present(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    match (present(a), present(b)) {
        (Some(a), Some(b)) => token_sort_similarity(a, b),
        _ => ADDRESS_FALLBACK_SCORE,
    }
}

/// Feature vector for a pair, `None` if either record lacks coordinates.
pub fn score_pair(left: &Record, right: &Record) -> Option<FeatureVector> {
    let (lp, rp) = (left.point()?, right.point()?);
    Some(FeatureVector {
        geo_distance_m: haversine_m(lp, rp),
        name_score: name_similarity(&left.name_norm, &right.name_norm),
        address_score: address_similarity(left.address(), right.address()),
    })
}
