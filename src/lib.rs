pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod rag;
pub mod status;
pub mod store;
pub mod turn;

#[cfg(test)]
mod testutil;

pub use context::{ContextManager, ConversationContext, StoreOutcome};
pub use error::{ContextError, EmbeddingError, InitError, StoreError};
pub use rag::{ScoreMethod, ScoredTurn};
pub use status::AvailabilityState;
pub use store::{MessageStore, Scope, Statistics};
pub use turn::{AssistantMessage, Speaker, Turn, UserMessage};
