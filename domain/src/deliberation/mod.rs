//! Deliberation entities and pure parsing logic
//!
//! Everything a single sub-problem deliberation is made of: the problem
//! decomposition, per-round expert contributions, round summaries, votes and
//! the completed sub-problem result. [`parsing`] holds the pure text
//! extraction functions applied to raw model output.

pub mod contribution;
pub mod parsing;
pub mod problem;
pub mod result;
pub mod round;

pub use contribution::{CallUsage, Contribution, ContributionKind};
pub use problem::{Problem, SubProblem};
pub use result::{ExpertVote, SubProblemResult};
pub use round::{RoundPhase, RoundSummary};
