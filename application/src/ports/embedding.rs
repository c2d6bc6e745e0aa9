//! Embedding service port

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding failed: {0}")]
    Failed(String),
}

/// Text to vector, used only for deduplication similarity and research
/// cache lookups.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
