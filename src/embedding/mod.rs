//! Text embedding backends.
//!
//! Every backend returns vectors of one fixed length per process; a response
//! of a different length is rejected as malformed rather than stored.

mod openai;

pub use openai::OpenAiEmbedder;

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::error::EmbeddingError;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Cheap health check, run once during initialization.
    async fn probe(&self) -> bool;

    /// Fixed vector length, if known yet.
    fn dimensions(&self) -> Option<usize>;
}

/// Builds the backend selected by configuration.
pub fn from_config(config: &Config) -> Arc<dyn EmbeddingService> {
    if !config.embedding_enabled || config.embedding_url.trim().is_empty() {
        info!("Embedding: Disabled by configuration, using lexical similarity only");
        return Arc::new(DisabledEmbedder);
    }
    Arc::new(OpenAiEmbedder::new(config))
}

/// Bounds any backend call, so a hung backend reads as a timeout.
pub async fn embed_within(
    service: &dyn EmbeddingService,
    text: &str,
    limit: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    match tokio::time::timeout(limit, service.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(EmbeddingError::Timeout(limit)),
    }
}

/// Backend used when embeddings are switched off.
pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingService for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("embeddings disabled".to_string()))
    }

    async fn probe(&self) -> bool {
        false
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }
}

/// Pins the vector length to the configured value or the first one seen.
#[derive(Debug, Default)]
pub(crate) struct DimensionGuard {
    expected: OnceLock<usize>,
}

impl DimensionGuard {
    pub(crate) fn new(configured: Option<usize>) -> Self {
        let expected = OnceLock::new();
        if let Some(dims) = configured {
            let _ = expected.set(dims);
        }
        Self { expected }
    }

    pub(crate) fn get(&self) -> Option<usize> {
        self.expected.get().copied()
    }

    pub(crate) fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if vector.is_empty() {
            return Err(EmbeddingError::MalformedResponse("empty vector".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::MalformedResponse(
                "non-finite vector component".to_string(),
            ));
        }
        let expected = *self.expected.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} dimensions, got {}",
                expected,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
