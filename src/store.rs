//! Storage seam for conversation turns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::turn::{NewTurn, Turn};

/// Narrowing applied to every retrieval: a guild and optionally one author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub guild_id: String,
    pub author_id: Option<String>,
}

impl Scope {
    pub fn guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            author_id: None,
        }
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_messages: u64,
    pub messages_with_vectors: u64,
    pub unique_channels: u64,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Whether the backend can be reached at all.
    async fn test_connection(&self) -> bool;

    /// Creates tables and indexes if missing. Safe to call repeatedly.
    async fn setup_schema(&self) -> bool;

    /// Persists a new turn and returns it with its write timestamp.
    async fn append(&self, turn: &NewTurn) -> Result<Turn, StoreError>;

    /// Turns in scope, most recent first, at most `limit`.
    ///
    /// When the scope names an author, the author's own turns and the
    /// assistant replies to them are returned. Turns from other guilds are
    /// never returned.
    async fn query_scope(
        &self,
        scope: &Scope,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Turn>, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError>;

    /// Removes turns written before `cutoff`. Returns the number removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Removes an author's turns in a guild together with the replies to them.
    async fn purge_author(&self, guild_id: &str, author_id: &str) -> Result<usize, StoreError>;
}
