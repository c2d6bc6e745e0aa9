//! Deterministic feature-hash embedder
//!
//! Hashes lowercase word tokens into a fixed number of buckets and
//! L2-normalizes the counts. No model call, no network, fully deterministic,
//! which is exactly what deduplication and cache lookups need: near-identical
//! texts land near each other, unrelated texts do not.

use async_trait::async_trait;
use conclave_application::ports::embedding::{EmbeddingError, EmbeddingService};
use std::hash::{DefaultHasher, Hash, Hasher};

const DIMENSIONS: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn bucket(token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % DIMENSIONS
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[Self::bucket(&token.to_lowercase())] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_application::engine::quality::cosine_similarity;

    #[tokio::test]
    async fn test_identical_text_embeds_identically() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Raise prices by ten percent").await.unwrap();
        let b = embedder.embed("Raise prices by ten percent").await.unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unrelated_text_scores_low() {
        let embedder = HashEmbedder::new();
        let a = embedder
            .embed("Raise prices by ten percent next quarter")
            .await
            .unwrap();
        let b = embedder
            .embed("Hire two backend engineers in Warsaw")
            .await
            .unwrap();
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
