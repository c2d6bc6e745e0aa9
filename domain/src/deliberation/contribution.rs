//! Expert contributions and per-call usage accounting

use serde::{Deserialize, Serialize};

/// Whether a contribution opened the deliberation or responded to others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionKind {
    Initial,
    Response,
}

/// Token and cost usage of one model call (Value Object).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallUsage {
    pub tokens: u64,
    pub cost: f64,
}

impl CallUsage {
    pub fn new(tokens: u64, cost: f64) -> Self {
        Self { tokens, cost }
    }

    pub fn add(&mut self, other: CallUsage) {
        self.tokens += other.tokens;
        self.cost += other.cost;
    }
}

/// One expert's statement in one round (Entity).
///
/// Produced only by the contribution generator; appended to a sequence
/// ordered by round and never mutated in place. Contributions from rounds
/// that already have a summary may be pruned to bound memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub persona_code: String,
    pub persona_name: String,
    pub content: String,
    /// Private chain-of-thought style reasoning, when the model exposes it.
    pub reasoning: Option<String>,
    pub kind: ContributionKind,
    /// Round this contribution belongs to (1-indexed).
    pub round: usize,
    pub usage: CallUsage,
}

impl Contribution {
    pub fn new(
        persona_code: impl Into<String>,
        persona_name: impl Into<String>,
        content: impl Into<String>,
        kind: ContributionKind,
        round: usize,
    ) -> Self {
        Self {
            persona_code: persona_code.into(),
            persona_name: persona_name.into(),
            content: content.into(),
            reasoning: None,
            kind,
            round,
            usage: CallUsage::default(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_usage(mut self, usage: CallUsage) -> Self {
        self.usage = usage;
        self
    }
}
