//! Checkpoint idempotency and corruption repair
//!
//! Execution state is persisted after every transition and may be restored
//! mid-workflow. Every phase step with an exactly-once side effect first asks
//! this guard whether the effect was already recorded, so resume never
//! regenerates completed work or double-counts cost. Restoration also
//! repairs one known structural corruption: a scalar identifier persisted as
//! a list instead of a string.

use crate::error::EngineError;
use conclave_domain::{ExecutionState, SessionId};
use serde_json::Value;
use tracing::warn;

pub struct CheckpointGuard;

impl CheckpointGuard {
    /// True when a result for this sub-problem id was already persisted.
    /// A repeated completion must only advance control fields.
    pub fn sub_problem_completed(state: &ExecutionState, sub_problem_id: &str) -> bool {
        state
            .results
            .iter()
            .any(|r| r.sub_problem_id == sub_problem_id)
    }

    /// True when contributions tagged with this round already exist, i.e.
    /// the round's generation pass already ran.
    pub fn round_already_generated(state: &ExecutionState, round: usize) -> bool {
        state.contributions.iter().any(|c| c.round == round)
    }

    /// True when the round already has its summary.
    pub fn round_already_summarized(state: &ExecutionState, round: usize) -> bool {
        state.has_summary_for_round(round)
    }

    /// Safe accessor for a persisted scalar id field.
    ///
    /// A corrupted checkpoint can surface the field as a list (its type's
    /// qualified-name path) instead of a string. A collection where a scalar
    /// is expected is treated as absent: the accessor returns `None` and
    /// logs exactly one warning, it never raises.
    pub fn safe_scalar_id(value: &Value, session_id: &SessionId) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::String(_) | Value::Null => None,
            Value::Array(items) => {
                warn!(
                    "Session {}: scalar id persisted as a list ({} items), treating as absent",
                    session_id,
                    items.len()
                );
                None
            }
            other => {
                warn!(
                    "Session {}: scalar id has unexpected shape ({}), treating as absent",
                    session_id, other
                );
                None
            }
        }
    }

    /// Decode raw persisted state into the one typed structure, repairing
    /// corrupted scalar id fields first. Internal logic never branches on
    /// map-vs-struct after this point.
    pub fn restore(mut raw: Value, session_id: &SessionId) -> Result<ExecutionState, EngineError> {
        Self::repair_ids(&mut raw, session_id);
        serde_json::from_value(raw).map_err(|e| {
            EngineError::StateCorruption(format!(
                "session {}: undecodable execution state: {}",
                session_id, e
            ))
        })
    }

    fn repair_ids(raw: &mut Value, session_id: &SessionId) {
        if let Some(subs) = raw
            .get_mut("problem")
            .and_then(|p| p.get_mut("sub_problems"))
            .and_then(|s| s.as_array_mut())
        {
            for sub in subs {
                let Some(id) = sub.get("id") else { continue };
                if id.is_string() {
                    continue;
                }
                let repaired = Self::safe_scalar_id(id, session_id).unwrap_or_default();
                sub["id"] = Value::String(repaired);
            }
        }
    }
}
