use async_openai::{
    config::OpenAIConfig,
    types::CreateEmbeddingRequestArgs,
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DimensionGuard, EmbeddingService};
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::error::EmbeddingError;

const PROBE_TEXT: &str = "embedding health check";

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    dims: DimensionGuard,
    cache: EmbeddingCache,
}

impl OpenAiEmbedder {
    pub fn new(config: &Config) -> Self {
        let api_key = config.embedding_api_key.as_deref().unwrap_or("unused");
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.embedding_url)
            .with_api_key(api_key);

        Self {
            client: Client::with_config(openai_config),
            model: config.embedding_model.clone(),
            timeout: config.embedding_timeout(),
            dims: DimensionGuard::new(config.embedding_dimensions),
            cache: EmbeddingCache::new(config.embedding_cache_capacity),
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))?
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse("no embedding returned".to_string()))?
            .embedding;

        self.dims.check(embedding)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(hit) = self.cache.get(text) {
            debug!("Embedding: Cache hit ({} chars)", text.len());
            return Ok(hit);
        }
        let vector = self.request(text).await?;
        self.cache.insert(text, vector.clone());
        Ok(vector)
    }

    async fn probe(&self) -> bool {
        match self.request(PROBE_TEXT).await {
            Ok(vector) => {
                info!(
                    "Embedding: Probe succeeded with model {} ({} dimensions)",
                    self.model,
                    vector.len()
                );
                true
            }
            Err(e) => {
                warn!("Embedding: Probe failed for model {}: {}", self.model, e);
                false
            }
        }
    }

    fn dimensions(&self) -> Option<usize> {
        self.dims.get()
    }
}
