//! In-memory research cache with embedding similarity lookup
//!
//! Findings carry a freshness deadline; stale entries are skipped on lookup
//! and swept on write. Lookup ranks candidates by cosine similarity of the
//! stored question embedding against the query embedding.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use conclave_application::engine::quality::cosine_similarity;
use conclave_application::ports::research_cache::{ResearchCache, ResearchFinding};
use conclave_application::ports::state_store::StoreError;
use std::sync::Mutex;
use std::time::Duration;

struct CachedFinding {
    finding: ResearchFinding,
    embedding: Vec<f32>,
    fresh_until: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryResearchCache {
    findings: Mutex<Vec<CachedFinding>>,
}

impl InMemoryResearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<CachedFinding>>, StoreError> {
        self.findings
            .lock()
            .map_err(|_| StoreError::Unavailable("research cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl ResearchCache for InMemoryResearchCache {
    async fn lookup(
        &self,
        query_embedding: &[f32],
        category: Option<&str>,
        industry: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResearchFinding>, StoreError> {
        let findings = self.lock()?;
        let now = Utc::now();
        let mut scored: Vec<(f32, &CachedFinding)> = findings
            .iter()
            .filter(|c| c.fresh_until > now)
            .filter(|c| match category {
                Some(cat) => c.finding.category.as_deref() == Some(cat),
                None => true,
            })
            .filter(|c| match industry {
                Some(ind) => c.finding.industry.as_deref() == Some(ind),
                None => true,
            })
            .map(|c| (cosine_similarity(query_embedding, &c.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.finding.clone())
            .collect())
    }

    async fn store(
        &self,
        finding: ResearchFinding,
        question_embedding: Vec<f32>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(7));
        let mut findings = self.lock()?;
        let now = Utc::now();
        findings.retain(|c| c.fresh_until > now);
        findings.push(CachedFinding {
            finding,
            embedding: question_embedding,
            fresh_until: now + ttl,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(question: &str, category: Option<&str>) -> ResearchFinding {
        ResearchFinding {
            question: question.to_string(),
            findings: format!("findings for {question}"),
            category: category.map(String::from),
            industry: None,
        }
    }

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[tokio::test]
    async fn test_lookup_ranks_by_similarity() {
        let cache = InMemoryResearchCache::new();
        cache
            .store(finding("pricing", None), vec![1.0, 0.0], WEEK)
            .await
            .unwrap();
        cache
            .store(finding("churn", None), vec![0.0, 1.0], WEEK)
            .await
            .unwrap();

        let hits = cache.lookup(&[0.9, 0.1], None, None, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question, "pricing");
    }

    #[tokio::test]
    async fn test_category_filter() {
        let cache = InMemoryResearchCache::new();
        cache
            .store(finding("a", Some("market")), vec![1.0], WEEK)
            .await
            .unwrap();
        cache
            .store(finding("b", Some("legal")), vec![1.0], WEEK)
            .await
            .unwrap();

        let hits = cache
            .lookup(&[1.0], Some("legal"), None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question, "b");
    }

    #[tokio::test]
    async fn test_stale_findings_are_skipped() {
        let cache = InMemoryResearchCache::new();
        cache
            .store(finding("old", None), vec![1.0], Duration::from_secs(0))
            .await
            .unwrap();

        let hits = cache.lookup(&[1.0], None, None, 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
