use std::cmp::Ordering;

use super::lexical::{jaccard, tokenize};
use super::{ScoreMethod, ScoredTurn};
use crate::config::Config;
use crate::turn::Turn;

/// Cosine similarity, or `None` when lengths differ or a vector has no norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    sim.is_finite().then_some(sim)
}

/// Orders candidate turns by relevance to a query.
///
/// Candidates whose vector matches the query vector's length are scored by
/// cosine similarity clamped to `[0, 1]`; all others by token overlap. When
/// one call mixes both paths, each path is divided by its own best score and
/// the lexical path is then scaled by `lexical_weight`, so raw cosine and raw
/// Jaccard values are never compared directly.
///
/// `min_score` is a floor on the raw per-path score and is applied before
/// merging, so it means the same thing whether or not paths are mixed.
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    min_score: f32,
    lexical_weight: f32,
}

impl Default for Ranker {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            lexical_weight: 0.5,
        }
    }
}

impl Ranker {
    pub fn new(min_score: f32, lexical_weight: f32) -> Self {
        Self {
            min_score: min_score.clamp(0.0, 1.0),
            lexical_weight: lexical_weight.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_score, config.lexical_weight)
    }

    pub fn rank(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        candidates: Vec<Turn>,
        top_k: usize,
    ) -> Vec<ScoredTurn> {
        if top_k == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        let mut scored: Vec<ScoredTurn> = candidates
            .into_iter()
            .map(|turn| {
                let cosine = query_vector
                    .zip(turn.vector.as_deref())
                    .and_then(|(q, v)| cosine_similarity(q, v));
                match cosine {
                    Some(sim) => ScoredTurn {
                        score: sim.clamp(0.0, 1.0),
                        method: ScoreMethod::Vector,
                        turn,
                    },
                    None => ScoredTurn {
                        score: jaccard(&query_tokens, &tokenize(&turn.content)),
                        method: ScoreMethod::Lexical,
                        turn,
                    },
                }
            })
            .collect();

        scored.retain(|s| s.score >= self.min_score);
        self.merge_paths(&mut scored);

        scored.sort_by(by_relevance);
        scored.truncate(top_k);
        scored
    }

    fn merge_paths(&self, scored: &mut [ScoredTurn]) {
        let best = |method: ScoreMethod| {
            scored
                .iter()
                .filter(|s| s.method == method)
                .map(|s| s.score)
                .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
        };
        let (Some(vector_best), Some(lexical_best)) =
            (best(ScoreMethod::Vector), best(ScoreMethod::Lexical))
        else {
            return;
        };

        for s in scored.iter_mut() {
            s.score = match s.method {
                ScoreMethod::Vector => normalize(s.score, vector_best),
                ScoreMethod::Lexical => normalize(s.score, lexical_best) * self.lexical_weight,
            };
        }
    }
}

fn normalize(score: f32, best: f32) -> f32 {
    if best > 0.0 {
        (score / best).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Highest score first; ties go to the more recent turn, then the larger id.
fn by_relevance(a: &ScoredTurn, b: &ScoredTurn) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.turn.created_at.cmp(&a.turn.created_at))
        .then_with(|| b.turn.id.cmp(&a.turn.id))
}
