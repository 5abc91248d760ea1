//! Token-overlap similarity used when vectors are missing.

use std::collections::HashSet;

/// Tokens shorter than this carry too little signal ("a", "i").
const MIN_TOKEN_CHARS: usize = 2;

/// Lowercased alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard index of two token sets. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

pub fn lexical_similarity(query: &str, candidate: &str) -> f32 {
    jaccard(&tokenize(query), &tokenize(candidate))
}
