//! Domain layer for conclave
//!
//! This crate contains the core entities and pure logic of the deliberation
//! engine. It has no dependencies on infrastructure or async concerns.
//!
//! # Core Concepts
//!
//! ## Deliberation
//!
//! A problem is decomposed into sub-problems; a panel of expert personas
//! debates each sub-problem over several rounds; the results are synthesized
//! into one final action plan.
//!
//! ## Phases
//!
//! Two distinct notions of "phase" coexist:
//!
//! - **Execution phase** ([`ExecutionPhase`]): the state-machine position of a
//!   session (Decomposition, GapCheck, rounds, Voting, Synthesis, ...).
//! - **Round phase** ([`RoundPhase`]): the behavioral stance of one round
//!   (Exploration, Challenge, Convergence), derived from round position.

pub mod complexity;
pub mod core;
pub mod deliberation;
pub mod persona;
pub mod session;

// Re-export commonly used types
pub use complexity::{ComplexityAssessment, ComplexityEstimator, ComplexityProfile};
pub use core::session_id::SessionId;
pub use deliberation::{
    contribution::{CallUsage, Contribution, ContributionKind},
    parsing,
    problem::{Problem, SubProblem},
    result::{ExpertVote, SubProblemResult},
    round::{RoundPhase, RoundSummary},
};
pub use persona::PersonaProfile;
pub use session::{
    clarification::{ClarificationQuestion, GapPriority, PendingClarification},
    events::{EVENT_SCHEMA_VERSION, TransitionEvent, TransitionKind},
    metrics::DeliberationMetrics,
    state::{ExecutionPhase, ExecutionState, SessionStatus, StopReason},
};
