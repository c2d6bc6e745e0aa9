//! Quality gate
//!
//! Two passes over a round's contributions: embedding-similarity
//! deduplication at a fixed threshold, then depth scoring of the survivors.
//! Shallow contributions produce structured feedback that the controller
//! appends to the rolling guidance injected into the next round.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ports::embedding::EmbeddingService;
use conclave_domain::Contribution;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one gate pass.
#[derive(Debug)]
pub struct QualityOutcome {
    pub kept: Vec<Contribution>,
    pub removed_duplicates: usize,
    /// One feedback line per shallow contribution.
    pub feedback: Vec<String>,
}

pub struct QualityGate {
    embeddings: Arc<dyn EmbeddingService>,
    dedup_threshold: f32,
    shallow_threshold: f64,
}

impl QualityGate {
    pub fn new(embeddings: Arc<dyn EmbeddingService>, config: &EngineConfig) -> Self {
        Self {
            embeddings,
            dedup_threshold: config.dedup_threshold,
            shallow_threshold: config.shallow_threshold,
        }
    }

    /// Deduplicate then score. The first contribution is always kept, so a
    /// non-empty round can never gate down to zero.
    pub async fn review(
        &self,
        contributions: Vec<Contribution>,
    ) -> Result<QualityOutcome, EngineError> {
        if contributions.is_empty() {
            return Ok(QualityOutcome {
                kept: Vec::new(),
                removed_duplicates: 0,
                feedback: Vec::new(),
            });
        }

        let embedded = futures::future::try_join_all(
            contributions.iter().map(|c| self.embeddings.embed(&c.content)),
        )
        .await
        .map_err(|e| EngineError::Fatal(e.to_string()))?;

        let mut kept: Vec<Contribution> = Vec::new();
        let mut kept_vectors: Vec<Vec<f32>> = Vec::new();
        let mut removed = 0;

        for (c, vector) in contributions.into_iter().zip(embedded) {
            let duplicate = kept_vectors
                .iter()
                .any(|kv| cosine_similarity(kv, &vector) >= self.dedup_threshold);
            // Failsafe: the first contribution always survives.
            if duplicate && !kept.is_empty() {
                debug!(
                    "Round {}: dropping near-duplicate contribution from {}",
                    c.round, c.persona_code
                );
                removed += 1;
                continue;
            }
            kept.push(c);
            kept_vectors.push(vector);
        }

        let mut feedback = Vec::new();
        for c in &kept {
            let score = depth_score(&c.content);
            if score < self.shallow_threshold {
                warn!(
                    "Round {}: shallow contribution from {} (depth {:.2})",
                    c.round, c.persona_code, score
                );
                feedback.push(format!(
                    "{}'s round-{} contribution was too shallow: cite concrete \
                     numbers, name evidence, and state specific next actions.",
                    c.persona_name, c.round
                ));
            }
        }

        Ok(QualityOutcome {
            kept,
            removed_duplicates: removed,
            feedback,
        })
    }
}

/// Cosine similarity of two vectors; 0.0 for degenerate input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Combined specificity/evidence/actionability score in [0, 1].
///
/// Saturating marker counts per dimension, averaged. Heuristic by design:
/// the gate flags obviously thin content, it does not rank good content.
pub fn depth_score(text: &str) -> f64 {
    let lower = text.to_lowercase();

    // Specificity: digits, percentages, units of measure
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let specificity = saturate(digits as f64 / 6.0);

    // Evidence: explicit grounding markers
    let evidence_markers = ["because", "data", "measured", "for example", "e.g.", "study", "benchmark", "we saw"];
    let evidence_hits: usize = evidence_markers.iter().map(|m| lower.matches(m).count()).sum();
    let evidence = saturate(evidence_hits as f64 / 2.0);

    // Actionability: imperative next-step verbs and list structure
    let action_markers = ["should", "adopt", "implement", "measure", "migrate", "define", "start by", "next step", "1.", "- "];
    let action_hits: usize = action_markers.iter().map(|m| lower.matches(m).count()).sum();
    let actionability = saturate(action_hits as f64 / 3.0);

    (specificity + evidence + actionability) / 3.0
}

fn saturate(v: f64) -> f64 {
    v.min(1.0)
}
