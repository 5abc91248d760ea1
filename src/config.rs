use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    /// Pooled connections for file databases. `:memory:` always uses one.
    pub database_pool_size: u32,
    pub embedding_enabled: bool,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    /// Expected vector length. Learned from the first response when unset.
    pub embedding_dimensions: Option<usize>,
    pub embedding_cache_capacity: usize,
    // Timeouts
    pub embedding_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub retrieval_timeout_secs: u64,
    // Retrieval settings
    pub candidate_pool_size: usize,
    pub default_top_k: usize,
    pub min_score: f32,
    pub lexical_weight: f32,
    /// Content shorter than this is stored without a vector.
    pub min_embed_chars: usize,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/context.db".to_string()),
            database_pool_size: parse_or("DATABASE_POOL_SIZE", 8),
            embedding_enabled: parse_or("EMBEDDING_ENABLED", true),
            embedding_url: env::var("EMBEDDING_URL").unwrap_or_else(|_| {
                env::var("LLAMA_URL").unwrap_or_else(|_| "http://localhost:8080/v1".to_string())
            }),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "local-model".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            embedding_dimensions: env::var("EMBEDDING_DIMENSIONS")
                .ok()
                .and_then(|d| d.parse().ok())
                .filter(|d: &usize| *d > 0),
            embedding_cache_capacity: parse_or("EMBEDDING_CACHE_CAPACITY", 512),
            embedding_timeout_secs: parse_or("EMBEDDING_TIMEOUT_SECS", 10),
            store_timeout_secs: parse_or("STORE_TIMEOUT_SECS", 5),
            retrieval_timeout_secs: parse_or("RETRIEVAL_TIMEOUT_SECS", 15),
            candidate_pool_size: parse_or("CONTEXT_CANDIDATE_POOL", 200),
            default_top_k: parse_or("CONTEXT_TOP_K", 10),
            min_score: parse_or("CONTEXT_MIN_SCORE", 0.0),
            lexical_weight: parse_or("CONTEXT_LEXICAL_WEIGHT", 0.5),
            min_embed_chars: parse_or("MIN_EMBED_CHARS", 3),
        };

        if config.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }
        if config.database_pool_size == 0 {
            anyhow::bail!("DATABASE_POOL_SIZE must be at least 1");
        }
        if !(0.0..=1.0).contains(&config.lexical_weight) {
            anyhow::bail!("CONTEXT_LEXICAL_WEIGHT must be within 0.0..=1.0");
        }
        Ok(config)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "data/context.db".to_string(),
            database_pool_size: 8,
            embedding_enabled: true,
            embedding_url: "http://localhost:8080/v1".to_string(),
            embedding_model: "local-model".to_string(),
            embedding_api_key: None,
            embedding_dimensions: None,
            embedding_cache_capacity: 512,
            embedding_timeout_secs: 10,
            store_timeout_secs: 5,
            retrieval_timeout_secs: 15,
            candidate_pool_size: 200,
            default_top_k: 10,
            min_score: 0.0,
            lexical_weight: 0.5,
            min_embed_chars: 3,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("database_pool_size", &self.database_pool_size)
            .field("embedding_enabled", &self.embedding_enabled)
            .field("embedding_url", &self.embedding_url)
            .field("embedding_model", &self.embedding_model)
            .field(
                "embedding_api_key",
                &self.embedding_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("embedding_cache_capacity", &self.embedding_cache_capacity)
            .field("embedding_timeout_secs", &self.embedding_timeout_secs)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("retrieval_timeout_secs", &self.retrieval_timeout_secs)
            .field("candidate_pool_size", &self.candidate_pool_size)
            .field("default_top_k", &self.default_top_k)
            .field("min_score", &self.min_score)
            .field("lexical_weight", &self.lexical_weight)
            .field("min_embed_chars", &self.min_embed_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Env vars are process-global, so everything lives in one test.
    #[test]
    fn test_config_logic() {
        // 1. Test defaults
        env::remove_var("DATABASE_URL");
        env::remove_var("CONTEXT_TOP_K");
        env::remove_var("EMBEDDING_DIMENSIONS");
        env::remove_var("CONTEXT_LEXICAL_WEIGHT");
        let config = Config::build().unwrap();
        assert_eq!(config.database_url, "data/context.db");
        assert_eq!(config.default_top_k, 10);
        assert_eq!(config.embedding_dimensions, None);
        assert_eq!(config.database_pool_size, 8);

        // 2. Test overrides and bad values
        env::set_var("CONTEXT_TOP_K", "4");
        env::set_var("CONTEXT_CANDIDATE_POOL", "not-a-number");
        env::set_var("EMBEDDING_DIMENSIONS", "384");
        let config = Config::build().unwrap();
        assert_eq!(config.default_top_k, 4);
        assert_eq!(config.candidate_pool_size, 200);
        assert_eq!(config.embedding_dimensions, Some(384));

        // 3. Out-of-range weight is rejected
        env::set_var("CONTEXT_LEXICAL_WEIGHT", "1.5");
        assert!(Config::build().is_err());
        env::remove_var("CONTEXT_LEXICAL_WEIGHT");

        env::set_var("DATABASE_POOL_SIZE", "0");
        assert!(Config::build().is_err());
        env::remove_var("DATABASE_POOL_SIZE");

        // 4. Test debug redaction
        env::set_var("EMBEDDING_API_KEY", "secret_api_key");
        let config_redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", config_redacted);
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("CONTEXT_TOP_K");
        env::remove_var("CONTEXT_CANDIDATE_POOL");
        env::remove_var("EMBEDDING_DIMENSIONS");
        env::remove_var("EMBEDDING_API_KEY");
    }
}
