//! Adaptive complexity scoring
//!
//! Scores a decomposed problem in [0, 1] from three weighted, saturating
//! factors and derives the round/expert budget for the rest of the session.
//! Pure logic; the estimator is constructed per session, never shared
//! mutable state.

use crate::deliberation::problem::SubProblem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const COUNT_WEIGHT: f64 = 0.4;
const MEAN_SCORE_WEIGHT: f64 = 0.4;
const DEPTH_WEIGHT: f64 = 0.2;

/// Sub-problem count at which the count factor saturates.
const COUNT_SATURATION: f64 = 5.0;
/// Dependency batch depth at which the depth factor saturates.
const DEPTH_SATURATION: f64 = 4.0;

/// Configured bounds for the adaptive budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityProfile {
    pub min_experts: usize,
    pub max_experts: usize,
    pub min_rounds: usize,
    pub max_rounds: usize,
    /// Scores below this are "simple": minimum budget, no interpolation.
    pub simple_threshold: f64,
}

impl Default for ComplexityProfile {
    fn default() -> Self {
        Self {
            min_experts: 3,
            max_experts: 7,
            min_rounds: 2,
            max_rounds: 6,
            simple_threshold: 0.3,
        }
    }
}

/// Result of one complexity assessment, kept on the session metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    /// Normalized overall score in [0, 1].
    pub score: f64,
    pub count_factor: f64,
    pub mean_score_factor: f64,
    pub depth_factor: f64,
    pub recommended_experts: usize,
    pub recommended_rounds: usize,
}

/// Derives the adaptive round/expert budget from a sub-problem set.
#[derive(Debug, Clone)]
pub struct ComplexityEstimator {
    profile: ComplexityProfile,
    /// Experiment override: bypasses the computed expert count entirely.
    expert_override: Option<usize>,
}

impl ComplexityEstimator {
    pub fn new(profile: ComplexityProfile) -> Self {
        Self {
            profile,
            expert_override: None,
        }
    }

    pub fn with_expert_override(mut self, experts: usize) -> Self {
        self.expert_override = Some(experts);
        self
    }

    pub fn assess(&self, sub_problems: &[SubProblem]) -> ComplexityAssessment {
        let count_factor = (sub_problems.len() as f64 / COUNT_SATURATION).min(1.0);

        let mean_score_factor = if sub_problems.is_empty() {
            0.0
        } else {
            let mean: f64 = sub_problems
                .iter()
                .map(|sp| sp.complexity_score as f64)
                .sum::<f64>()
                / sub_problems.len() as f64;
            // Map 1-10 onto [0, 1]
            ((mean - 1.0) / 9.0).clamp(0.0, 1.0)
        };

        let depth = dependency_batch_depth(sub_problems);
        let depth_factor = (depth as f64 / DEPTH_SATURATION).min(1.0);

        let score = COUNT_WEIGHT * count_factor
            + MEAN_SCORE_WEIGHT * mean_score_factor
            + DEPTH_WEIGHT * depth_factor;

        let recommended_experts = match self.expert_override {
            Some(n) => n,
            None => interpolate(
                score,
                self.profile.simple_threshold,
                self.profile.min_experts,
                self.profile.max_experts,
            ),
        };
        let recommended_rounds = interpolate(
            score,
            self.profile.simple_threshold,
            self.profile.min_rounds,
            self.profile.max_rounds,
        );

        ComplexityAssessment {
            score,
            count_factor,
            mean_score_factor,
            depth_factor,
            recommended_experts,
            recommended_rounds,
        }
    }
}

/// Linear interpolation between min and max once above the simple threshold.
///
/// Monotonic non-decreasing over [0, 1]; exactly `min` at 0 and `max` at 1.
fn interpolate(score: f64, threshold: f64, min: usize, max: usize) -> usize {
    if score < threshold || max <= min {
        return min;
    }
    let span = (1.0 - threshold).max(f64::EPSILON);
    let ratio = ((score - threshold) / span).clamp(0.0, 1.0);
    min + ((max - min) as f64 * ratio).round() as usize
}

/// Number of dependency batches when sub-problems are scheduled in waves:
/// each batch holds every sub-problem whose dependencies are already
/// resolved. Unknown or cyclic dependencies collapse into one final batch
/// rather than looping.
fn dependency_batch_depth(sub_problems: &[SubProblem]) -> usize {
    if sub_problems.is_empty() {
        return 0;
    }
    let known: HashSet<&str> = sub_problems.iter().map(|sp| sp.id.as_str()).collect();
    let mut resolved: HashSet<&str> = HashSet::new();
    let mut depth = 0;

    while resolved.len() < sub_problems.len() {
        let batch: Vec<&str> = sub_problems
            .iter()
            .filter(|sp| !resolved.contains(sp.id.as_str()))
            .filter(|sp| {
                sp.depends_on
                    .iter()
                    .all(|d| resolved.contains(d.as_str()) || !known.contains(d.as_str()))
            })
            .map(|sp| sp.id.as_str())
            .collect();
        depth += 1;
        if batch.is_empty() {
            // Cycle: everything remaining forms one degenerate batch.
            break;
        }
        resolved.extend(batch);
    }
    depth
}
