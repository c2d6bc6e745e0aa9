//! Session-level metrics
//!
//! Costs accumulate monotonically per phase key. `total_cost` is maintained
//! as the running sum of all recorded phase costs; double counting is
//! prevented upstream by the checkpoint guard (a re-entered phase skips its
//! already-recorded generation work entirely).

use crate::complexity::ComplexityAssessment;
use crate::deliberation::contribution::CallUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliberationMetrics {
    pub total_cost: f64,
    pub total_tokens: u64,
    /// Cost by phase key (e.g. "decomposition", "round-2", "synthesis").
    pub phase_costs: BTreeMap<String, f64>,
    pub complexity: Option<ComplexityAssessment>,
    pub recommended_rounds: usize,
    pub recommended_experts: usize,
}

impl DeliberationMetrics {
    /// Record usage under a phase key. Accumulation only — there is no way
    /// to subtract or overwrite a recorded cost.
    pub fn record(&mut self, phase_key: &str, usage: CallUsage) {
        self.total_cost += usage.cost;
        self.total_tokens += usage.tokens;
        *self.phase_costs.entry(phase_key.to_string()).or_insert(0.0) += usage.cost;
    }

    /// Sum of all recorded phase costs. Always equals `total_cost`.
    pub fn phase_cost_sum(&self) -> f64 {
        self.phase_costs.values().sum()
    }
}
