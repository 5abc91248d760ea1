//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::db::Database;
use crate::embedding::EmbeddingService;
use crate::error::{EmbeddingError, StoreError};
use crate::rag::lexical::tokenize;
use crate::store::{MessageStore, Scope, Statistics};
use crate::turn::{AssistantMessage, NewTurn, Turn, UserMessage};

pub fn test_config() -> Config {
    Config {
        database_url: ":memory:".to_string(),
        embedding_timeout_secs: 1,
        store_timeout_secs: 2,
        retrieval_timeout_secs: 3,
        ..Config::default()
    }
}

pub fn user_message(id: &str, guild: &str, channel: &str, author: &str, content: &str) -> UserMessage {
    UserMessage {
        id: id.to_string(),
        content: content.to_string(),
        author_id: author.to_string(),
        author_name: author.to_string(),
        channel_id: channel.to_string(),
        guild_id: guild.to_string(),
    }
}

pub fn assistant_message(reply_to: &str, guild: &str, channel: &str, content: &str) -> AssistantMessage {
    AssistantMessage {
        in_reply_to: reply_to.to_string(),
        content: content.to_string(),
        channel_id: channel.to_string(),
        guild_id: guild.to_string(),
    }
}

pub fn user_turn(id: &str, guild: &str, channel: &str, author: &str, content: &str) -> NewTurn {
    user_message(id, guild, channel, author, content).into_new_turn(None)
}

pub fn assistant_turn(reply_to: &str, guild: &str, channel: &str, content: &str) -> NewTurn {
    assistant_message(reply_to, guild, channel, content).into_new_turn(None)
}

/// A persisted turn built directly, for ranker tests that need no store.
pub fn stored_turn(id: &str, content: &str, secs: i64, vector: Option<Vec<f32>>) -> Turn {
    let new = user_turn(id, "g1", "c1", "u1", content);
    Turn {
        id: new.id,
        speaker: new.speaker,
        content: new.content,
        channel_id: new.channel_id,
        guild_id: new.guild_id,
        vector,
        created_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap_or_default(),
    }
}

/// Deterministic bag-of-words embedder: texts sharing tokens point the same way.
pub struct KeywordEmbedder {
    dims: usize,
    available: AtomicBool,
    calls: AtomicUsize,
    probe_delay: Duration,
}

impl KeywordEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            probe_delay: Duration::ZERO,
        }
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn unavailable(dims: usize) -> Self {
        let svc = Self::new(dims);
        svc.set_available(false);
        svc
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let bucket = token
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            v[bucket as usize % self.dims] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("keyword embedder offline".to_string()));
        }
        Ok(self.vector_for(text))
    }

    async fn probe(&self) -> bool {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.available.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dims)
    }
}

/// Healthy at probe time, then never answers within any sane timeout.
pub struct SlowEmbedder {
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EmbeddingService for SlowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![1.0; 4])
    }

    async fn probe(&self) -> bool {
        true
    }

    fn dimensions(&self) -> Option<usize> {
        Some(4)
    }
}

/// Wraps an in-memory database with switchable failures and latency.
pub struct ScriptedStore {
    pub inner: Database,
    pub connect_ok: bool,
    pub schema_ok: bool,
    pub query_delay: Option<Duration>,
}

impl ScriptedStore {
    pub fn healthy() -> Self {
        Self {
            inner: Database::new(&test_config()),
            connect_ok: true,
            schema_ok: true,
            query_delay: None,
        }
    }
}

#[async_trait]
impl MessageStore for ScriptedStore {
    async fn test_connection(&self) -> bool {
        self.connect_ok && self.inner.test_connection().await
    }

    async fn setup_schema(&self) -> bool {
        self.schema_ok && self.inner.setup_schema().await
    }

    async fn append(&self, turn: &NewTurn) -> Result<Turn, StoreError> {
        self.inner.append(turn).await
    }

    async fn query_scope(
        &self,
        scope: &Scope,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Turn>, StoreError> {
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.query_scope(scope, limit, before).await
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        self.inner.statistics().await
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.prune_older_than(cutoff).await
    }

    async fn purge_author(&self, guild_id: &str, author_id: &str) -> Result<usize, StoreError> {
        self.inner.purge_author(guild_id, author_id).await
    }
}
