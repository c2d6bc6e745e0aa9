//! Typed transition events
//!
//! The engine emits an ordered sequence of these per session. Each carries a
//! monotonically increasing per-session sequence number and a schema version
//! so downstream consumers can request replay from any prior sequence number
//! after a connection gap. The engine owns the sequencing contract only; the
//! transport lives outside.

use crate::core::session_id::SessionId;
use serde::{Deserialize, Serialize};

/// Bumped whenever the event payload shape changes incompatibly.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// What happened, with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionKind {
    PhaseStarted { phase: String },
    PhaseEnded { phase: String },
    ContributionProduced { persona_code: String, round: usize },
    QualityIssue { round: usize, detail: String },
    ClarificationRequested { question_count: usize },
    ClarificationAnswered { remaining: usize },
    SubProblemComplete { sub_problem_id: String, index: usize },
    MetaSynthesisComplete,
    Error { error_kind: String, message: String },
}

/// One ordered transition notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub session_id: SessionId,
    /// Monotonically increasing per session, starting at 1.
    pub sequence: u64,
    pub schema_version: u32,
    #[serde(flatten)]
    pub kind: TransitionKind,
}

impl TransitionEvent {
    pub fn new(session_id: SessionId, sequence: u64, kind: TransitionKind) -> Self {
        Self {
            session_id,
            sequence,
            schema_version: EVENT_SCHEMA_VERSION,
            kind,
        }
    }
}
