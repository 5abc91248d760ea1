//! Conversation context management for persistent LLM memory
//!
//! Records conversation turns and, for each new utterance, retrieves the
//! prior turns most relevant to it within a guild (and optionally author)
//! scope. Infrastructure failures degrade to an empty context; they never
//! interrupt the caller's reply flow.

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::embedding::{self, embed_within, EmbeddingService};
use crate::error::{ContextError, InitError, StoreError};
use crate::rag::{Ranker, ScoredTurn};
use crate::status::{Availability, AvailabilityState, SessionCounters, SessionSnapshot};
use crate::store::{MessageStore, Scope, Statistics};
use crate::turn::{AssistantMessage, NewTurn, Speaker, Turn, UserMessage};

/// What happened to a best-effort write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { with_vector: bool },
    /// The id was already stored; the existing turn is kept.
    Duplicate,
    /// The store is not usable in the current state.
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
struct Settings {
    candidate_pool_size: usize,
    default_top_k: usize,
    min_embed_chars: usize,
    embedding_timeout: Duration,
    store_timeout: Duration,
    retrieval_timeout: Duration,
}

impl Settings {
    fn from_config(config: &Config) -> Self {
        Self {
            candidate_pool_size: config.candidate_pool_size.max(1),
            default_top_k: config.default_top_k,
            min_embed_chars: config.min_embed_chars,
            embedding_timeout: config.embedding_timeout(),
            store_timeout: config.store_timeout(),
            retrieval_timeout: config.retrieval_timeout(),
        }
    }
}

/// Owns the store, embedder and availability state. Build one at startup and
/// share it (behind an `Arc`) with every caller.
pub struct ContextManager {
    store: Arc<dyn MessageStore>,
    embedder: Arc<dyn EmbeddingService>,
    ranker: Ranker,
    availability: Availability,
    counters: SessionCounters,
    settings: Settings,
}

impl ContextManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn MessageStore>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Self {
        Self {
            store,
            embedder,
            ranker: Ranker::from_config(config),
            availability: Availability::default(),
            counters: SessionCounters::default(),
            settings: Settings::from_config(config),
        }
    }

    /// SQLite store plus the configured embedding backend.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(Database::new(config)),
            embedding::from_config(config),
        )
    }

    /// Runs the startup checks and records the resulting state.
    ///
    /// Concurrent callers are serialized; once semantic mode is reached
    /// further calls return immediately. From a degraded state the checks
    /// run again while callers keep being served from that state.
    pub async fn try_initialize(&self) -> Result<(), InitError> {
        let _guard = self.availability.lock_init().await;
        let current = self.availability.current();
        if current.is_semantic() {
            return Ok(());
        }

        if current == AvailabilityState::Uninitialized {
            self.availability.transition(AvailabilityState::Probing);
        }
        let outcome = self.run_checks().await;
        self.availability.transition(match outcome {
            Ok(()) => AvailabilityState::SemanticReady,
            Err(e) => AvailabilityState::Degraded(e),
        });
        outcome
    }

    /// Like [`try_initialize`](Self::try_initialize) but only reports
    /// whether semantic mode is available.
    pub async fn initialize(&self) -> bool {
        match self.try_initialize().await {
            Ok(()) => {
                info!("Context: Semantic mode ready");
                true
            }
            Err(InitError::EmbeddingProbeFailed) => {
                warn!("Context: Embeddings unavailable, storing turns without vectors and ranking lexically");
                false
            }
            Err(e) => {
                error!("Context: Initialization failed ({}), continuing without context", e);
                false
            }
        }
    }

    async fn run_checks(&self) -> Result<(), InitError> {
        let connected = tokio::time::timeout(self.settings.store_timeout, self.store.test_connection())
            .await
            .unwrap_or(false);
        if !connected {
            return Err(InitError::StoreUnreachable);
        }

        let schema_ready = tokio::time::timeout(self.settings.store_timeout, self.store.setup_schema())
            .await
            .unwrap_or(false);
        if !schema_ready {
            return Err(InitError::SchemaFailed);
        }

        let probed = tokio::time::timeout(self.settings.embedding_timeout, self.embedder.probe())
            .await
            .unwrap_or(false);
        if !probed {
            return Err(InitError::EmbeddingProbeFailed);
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.availability.current().is_semantic()
    }

    pub fn state(&self) -> AvailabilityState {
        self.availability.current()
    }

    /// Up to `top_k` prior turns relevant to `query`, most relevant first.
    ///
    /// Only malformed scope arguments are errors. An unusable store, a slow
    /// backend or a failed embedding all yield a shorter or empty result.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        guild_id: &str,
        author_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<ScoredTurn>, ContextError> {
        let scope = build_scope(guild_id, author_id)?;

        let state = self.availability.current();
        if !state.store_usable() {
            debug!("Context: Store not usable ({:?}), returning empty context", state);
            return Ok(Vec::new());
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let retrieval = self.retrieve(query, &scope, top_k, state.vectors_enabled());
        match tokio::time::timeout(self.settings.retrieval_timeout, retrieval).await {
            Ok(results) => Ok(results),
            Err(_) => {
                warn!(
                    "Context: Retrieval for guild {} timed out after {:?}",
                    scope.guild_id, self.settings.retrieval_timeout
                );
                Ok(Vec::new())
            }
        }
    }

    /// [`get_relevant_context`](Self::get_relevant_context) with the configured `top_k`.
    pub async fn get_default_context(
        &self,
        query: &str,
        guild_id: &str,
        author_id: Option<&str>,
    ) -> Result<Vec<ScoredTurn>, ContextError> {
        self.get_relevant_context(query, guild_id, author_id, self.settings.default_top_k)
            .await
    }

    async fn retrieve(
        &self,
        query: &str,
        scope: &Scope,
        top_k: usize,
        use_vectors: bool,
    ) -> Vec<ScoredTurn> {
        let pool_size = self.settings.candidate_pool_size.max(top_k);
        let candidates = match self
            .bounded_store(self.store.query_scope(scope, pool_size, None))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Context: Candidate query failed for guild {}: {}", scope.guild_id, e);
                return Vec::new();
            }
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        // A query vector is useless when no candidate carries one.
        let query_vector = if use_vectors && candidates.iter().any(Turn::has_vector) {
            self.embed_best_effort(query).await
        } else {
            None
        };

        let pool = candidates.len();
        let results = self
            .ranker
            .rank(query, query_vector.as_deref(), candidates, top_k);
        debug!(
            "Context: Ranked {} candidates in guild {} down to {} ({})",
            pool,
            scope.guild_id,
            results.len(),
            if query_vector.is_some() { "semantic" } else { "lexical" }
        );
        results
    }

    pub async fn store_user_message(&self, message: UserMessage) -> StoreOutcome {
        let state = self.availability.current();
        if !state.store_usable() {
            self.counters.record_skipped();
            return StoreOutcome::Skipped;
        }
        let vector = if state.vectors_enabled() {
            self.embed_best_effort(&message.content).await
        } else {
            None
        };
        self.persist(message.into_new_turn(vector)).await
    }

    pub async fn store_assistant_message(&self, message: AssistantMessage) -> StoreOutcome {
        let state = self.availability.current();
        if !state.store_usable() {
            self.counters.record_skipped();
            return StoreOutcome::Skipped;
        }
        let vector = if state.vectors_enabled() {
            self.embed_best_effort(&message.content).await
        } else {
            None
        };
        self.persist(message.into_new_turn(vector)).await
    }

    async fn persist(&self, turn: NewTurn) -> StoreOutcome {
        if turn.id.trim().is_empty() || turn.guild_id.trim().is_empty() {
            warn!("Context: Refusing to store turn without id or guild");
            self.counters.record_failed();
            return StoreOutcome::Failed;
        }

        let with_vector = turn.vector.is_some();
        match self.bounded_store(self.store.append(&turn)).await {
            Ok(stored) => {
                debug!(
                    "Context: Stored {} turn {} (vector: {})",
                    stored.speaker.role(),
                    stored.id,
                    with_vector
                );
                self.counters.record_stored(with_vector);
                StoreOutcome::Stored { with_vector }
            }
            Err(StoreError::DuplicateId(id)) => {
                debug!("Context: Turn {} already stored, keeping the original", id);
                self.counters.record_duplicate();
                StoreOutcome::Duplicate
            }
            Err(e) => {
                warn!("Context: Failed to store turn {}: {}", turn.id, e);
                self.counters.record_failed();
                StoreOutcome::Failed
            }
        }
    }

    /// Store-wide counters; all zero when the store cannot be read.
    pub async fn get_statistics(&self) -> Statistics {
        if !self.availability.current().store_usable() {
            return Statistics::default();
        }
        match self.bounded_store(self.store.statistics()).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Context: Statistics unavailable: {}", e);
                Statistics::default()
            }
        }
    }

    pub fn session_counters(&self) -> SessionSnapshot {
        self.counters.snapshot()
    }

    /// Deletes turns older than `days`. Returns the number removed.
    pub async fn prune_older_than(&self, days: u32) -> usize {
        if !self.availability.current().store_usable() {
            return 0;
        }
        let Some(cutoff) = ChronoDuration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            warn!("Context: Retention of {} days reaches before the earliest date, nothing to prune", days);
            return 0;
        };
        match self.bounded_store(self.store.prune_older_than(cutoff)).await {
            Ok(n) => {
                info!("Context: Pruned {} turns older than {} days", n, days);
                n
            }
            Err(e) => {
                warn!("Context: Retention cleanup failed: {}", e);
                0
            }
        }
    }

    /// Deletes an author's turns in a guild and the replies to them.
    pub async fn purge_author(&self, guild_id: &str, author_id: &str) -> Result<usize, ContextError> {
        build_scope(guild_id, Some(author_id))?;
        if !self.availability.current().store_usable() {
            return Ok(0);
        }
        match self
            .bounded_store(self.store.purge_author(guild_id, author_id))
            .await
        {
            Ok(n) => {
                info!("Context: Purged {} turns for author {} in guild {}", n, author_id, guild_id);
                Ok(n)
            }
            Err(e) => {
                warn!("Context: Purge failed for author {}: {}", author_id, e);
                Ok(0)
            }
        }
    }

    async fn embed_best_effort(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().chars().count() < self.settings.min_embed_chars {
            return None;
        }
        match embed_within(self.embedder.as_ref(), text, self.settings.embedding_timeout).await {
            Ok(vector) => match self.embedder.dimensions() {
                Some(dims) if dims != vector.len() => {
                    warn!(
                        "Context: Dropping vector of length {} (expected {})",
                        vector.len(),
                        dims
                    );
                    None
                }
                _ => Some(vector),
            },
            Err(e) => {
                debug!("Context: Continuing without vector: {}", e);
                None
            }
        }
    }

    async fn bounded_store<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.settings.store_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable(format!("timed out after {:?}", limit))))
    }
}

fn build_scope(guild_id: &str, author_id: Option<&str>) -> Result<Scope, ContextError> {
    if guild_id.trim().is_empty() {
        return Err(ContextError::InvalidScope("guild id must not be empty".to_string()));
    }
    let mut scope = Scope::guild(guild_id);
    if let Some(author_id) = author_id {
        if author_id.trim().is_empty() {
            return Err(ContextError::InvalidScope(
                "author id must not be empty when given".to_string(),
            ));
        }
        scope = scope.with_author(author_id);
    }
    Ok(scope)
}

/// Formats retrieved turns into LLM-compatible context messages
pub struct ConversationContext;

impl ConversationContext {
    /// Returns messages oldest-first, formatted as user/assistant messages
    pub fn to_chat_messages(results: &[ScoredTurn]) -> Vec<ChatCompletionRequestMessage> {
        let mut turns: Vec<&Turn> = results.iter().map(|s| &s.turn).collect();
        turns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        turns.into_iter().filter_map(Self::format_turn).collect()
    }

    fn format_turn(turn: &Turn) -> Option<ChatCompletionRequestMessage> {
        // Skip empty messages
        if turn.content.trim().is_empty() {
            return None;
        }

        match &turn.speaker {
            Speaker::Assistant { .. } => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()
                .ok()
                .map(|m| m.into()),
            Speaker::User { author_name, .. } => {
                // Other users' messages become user messages with attribution
                let formatted = format!("[{}]: {}", author_name, turn.content);
                ChatCompletionRequestUserMessageArgs::default()
                    .content(formatted)
                    .build()
                    .ok()
                    .map(|m| m.into())
            }
        }
    }
}
