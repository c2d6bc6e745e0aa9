//! Votes and completed sub-problem results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One expert's final position on a sub-problem.
///
/// This is a free-text recommendation with confidence and conditions, not a
/// binary approve/reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertVote {
    pub persona_code: String,
    pub recommendation: String,
    /// Confidence level (0.0 to 1.0)
    pub confidence: f64,
    pub reasoning: String,
    /// Conditions under which the recommendation holds.
    pub conditions: Vec<String>,
}

impl ExpertVote {
    pub fn new(
        persona_code: impl Into<String>,
        recommendation: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            persona_code: persona_code.into(),
            recommendation: recommendation.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            conditions: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Outcome of one fully deliberated sub-problem (Entity).
///
/// Created exactly once when the sub-problem completes; thereafter immutable.
/// The result list on the session is append-only, ordered by sub-problem
/// index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProblemResult {
    pub sub_problem_id: String,
    pub synthesis: String,
    pub votes: Vec<ExpertVote>,
    pub contribution_count: usize,
    /// Cost attributed to this sub-problem alone (running total delta).
    pub cost: f64,
    pub duration: Duration,
    /// Persona codes of the panel that deliberated this sub-problem.
    pub expert_panel: Vec<String>,
    /// Per-expert memory summaries carried into later sub-problems.
    pub expert_memories: BTreeMap<String, String>,
}

impl SubProblemResult {
    pub fn new(sub_problem_id: impl Into<String>, synthesis: impl Into<String>) -> Self {
        Self {
            sub_problem_id: sub_problem_id.into(),
            synthesis: synthesis.into(),
            votes: Vec::new(),
            contribution_count: 0,
            cost: 0.0,
            duration: Duration::ZERO,
            expert_panel: Vec::new(),
            expert_memories: BTreeMap::new(),
        }
    }
}
