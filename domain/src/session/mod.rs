//! Session-scoped entities: execution state, metrics, clarifications, events

pub mod clarification;
pub mod events;
pub mod metrics;
pub mod state;

pub use clarification::{ClarificationQuestion, GapPriority, PendingClarification};
pub use events::{EVENT_SCHEMA_VERSION, TransitionEvent, TransitionKind};
pub use metrics::DeliberationMetrics;
pub use state::{ExecutionPhase, ExecutionState, SessionStatus, StopReason};
