//! Relevance ranking of stored turns against a new utterance.

pub mod lexical;
mod ranker;

pub use ranker::{cosine_similarity, Ranker};

use serde::Serialize;

use crate::turn::Turn;

/// Which scoring path produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    Vector,
    Lexical,
}

/// One retrieved turn and its relevance in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTurn {
    pub turn: Turn,
    pub score: f32,
    pub method: ScoreMethod,
}
