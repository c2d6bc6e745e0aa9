//! Round phases and summaries

use serde::{Deserialize, Serialize};

/// Behavioral stance of a round: what its contributions should contain.
///
/// Derived purely from round position. The round budget is split into
/// thirds (ceiling rounding at the boundaries): the first third explores the
/// solution space, the middle third challenges what was proposed, the final
/// third converges on a recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    #[default]
    Exploration,
    Challenge,
    Convergence,
}

impl RoundPhase {
    /// Determine the behavioral phase for a round (1-indexed).
    ///
    /// Round 1 is always Exploration regardless of the budget.
    pub fn for_round(round: usize, max_rounds: usize) -> Self {
        if round <= 1 {
            return RoundPhase::Exploration;
        }
        let third = max_rounds.div_ceil(3);
        if round <= third {
            RoundPhase::Exploration
        } else if round <= third * 2 {
            RoundPhase::Challenge
        } else {
            RoundPhase::Convergence
        }
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, RoundPhase::Challenge)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundPhase::Exploration => write!(f, "Exploration"),
            RoundPhase::Challenge => write!(f, "Challenge"),
            RoundPhase::Convergence => write!(f, "Convergence"),
        }
    }
}

/// Lossy compression of one round (Value Object).
///
/// Exactly one summary exists per completed round. Later rounds receive the
/// summary list as context instead of the raw transcript, which lets the raw
/// contributions of summarized rounds be pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: usize,
    pub phase: RoundPhase,
    pub text: String,
}

impl RoundSummary {
    pub fn new(round: usize, phase: RoundPhase, text: impl Into<String>) -> Self {
        Self {
            round,
            phase,
            text: text.into(),
        }
    }
}
