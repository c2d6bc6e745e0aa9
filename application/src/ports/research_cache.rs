//! Research cache port
//!
//! Semantic lookup over previously researched questions, filtered by
//! category/industry. Writes carry a freshness TTL; stale findings must not
//! be returned.

use crate::ports::state_store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One cached research finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchFinding {
    pub question: String,
    pub findings: String,
    pub category: Option<String>,
    pub industry: Option<String>,
}

#[async_trait]
pub trait ResearchCache: Send + Sync {
    /// Nearest fresh findings by question embedding, optionally filtered.
    async fn lookup(
        &self,
        query_embedding: &[f32],
        category: Option<&str>,
        industry: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResearchFinding>, StoreError>;

    /// Store a finding with its question embedding and freshness TTL.
    async fn store(
        &self,
        finding: ResearchFinding,
        question_embedding: Vec<f32>,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}
