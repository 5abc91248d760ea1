use std::time::Duration;
use thiserror::Error;

/// Failures of the durable turn store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The id is already stored. Callers treat this as an idempotent no-op.
    #[error("turn {0} already stored")]
    DuplicateId(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(format!("connection pool: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
}

/// Why initialization left the manager in simple mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("store connectivity check failed")]
    StoreUnreachable,
    #[error("store schema setup failed")]
    SchemaFailed,
    #[error("embedding probe failed")]
    EmbeddingProbeFailed,
}

/// Caller misuse. Infrastructure failures never surface through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}
