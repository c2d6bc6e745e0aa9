//! Execution state: the single persisted unit of a running session
//!
//! The phase controller is the sole owner of mutation; the state is written
//! to the store as one atomic unit after every transition and restored whole
//! on resume.

use crate::core::session_id::SessionId;
use crate::deliberation::contribution::Contribution;
use crate::deliberation::problem::{Problem, SubProblem};
use crate::deliberation::result::{ExpertVote, SubProblemResult};
use crate::deliberation::round::RoundSummary;
use crate::session::clarification::PendingClarification;
use crate::session::metrics::DeliberationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position in the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionPhase {
    Decomposition,
    ContextCollection,
    GapCheck,
    Selection,
    InitialRound,
    ParallelRound,
    Voting,
    Synthesis,
    NextSubProblem,
    MetaSynthesis,
    Complete,
    // Side states
    Paused,
    Clarifying,
    Killed,
    Errored,
}

impl ExecutionPhase {
    /// Terminal phases permit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::Complete | ExecutionPhase::Killed | ExecutionPhase::Errored
        )
    }

    /// Suspended phases wait for an external command before re-entering.
    pub fn is_suspended(&self) -> bool {
        matches!(self, ExecutionPhase::Paused | ExecutionPhase::Clarifying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Decomposition => "decomposition",
            ExecutionPhase::ContextCollection => "context_collection",
            ExecutionPhase::GapCheck => "gap_check",
            ExecutionPhase::Selection => "selection",
            ExecutionPhase::InitialRound => "initial_round",
            ExecutionPhase::ParallelRound => "parallel_round",
            ExecutionPhase::Voting => "voting",
            ExecutionPhase::Synthesis => "synthesis",
            ExecutionPhase::NextSubProblem => "next_sub_problem",
            ExecutionPhase::MetaSynthesis => "meta_synthesis",
            ExecutionPhase::Complete => "complete",
            ExecutionPhase::Paused => "paused",
            ExecutionPhase::Clarifying => "clarifying",
            ExecutionPhase::Killed => "killed",
            ExecutionPhase::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally visible session status, carried on store metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    WaitingForClarification,
    Completed,
    Killed,
    Errored,
}

/// Why a session stopped or suspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Paused,
    AwaitingClarification,
    Killed,
    HardTimeout,
    Stuck,
    Errored { kind: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Paused => write!(f, "paused"),
            StopReason::AwaitingClarification => write!(f, "awaiting clarification"),
            StopReason::Killed => write!(f, "killed"),
            StopReason::HardTimeout => write!(f, "hard timeout"),
            StopReason::Stuck => write!(f, "stuck"),
            StopReason::Errored { kind } => write!(f, "errored: {}", kind),
        }
    }
}

/// The live working set of one session (Aggregate Root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub session_id: SessionId,
    /// User that started the session; kill/clarify require ownership.
    pub owner: String,
    pub phase: ExecutionPhase,
    /// Current round within the current sub-problem (1-indexed; 0 before
    /// the first round starts).
    pub round: usize,
    pub sub_problem_index: usize,
    pub problem: Problem,
    /// Contributions for the current sub-problem, ordered by round.
    pub contributions: Vec<Contribution>,
    /// Total contributions kept for the current sub-problem, across all
    /// rounds, surviving pruning.
    pub contribution_total: usize,
    /// One per completed round, append-only, ordered by round number.
    pub round_summaries: Vec<RoundSummary>,
    /// Completed sub-problems, append-only, ordered by sub-problem index.
    pub results: Vec<SubProblemResult>,
    pub pending_clarification: Option<PendingClarification>,
    pub stopped: bool,
    pub stop_reason: Option<StopReason>,
    /// Rolling facilitator guidance injected into subsequent rounds.
    pub guidance: Vec<String>,
    /// Set when clarification answers were empty or suspiciously short;
    /// synthesis adds an assumptions disclosure when this is on.
    pub limited_context_mode: bool,
    /// Persona codes of the panel for the current sub-problem.
    pub expert_panel: Vec<String>,
    /// Per-expert memory carried across sub-problems.
    pub expert_memories: BTreeMap<String, String>,
    pub metrics: DeliberationMetrics,
    pub sub_problem_started_at: Option<DateTime<Utc>>,
    /// Votes collected for the current sub-problem, cleared on advance.
    pub votes: Vec<ExpertVote>,
    /// Synthesis text for the current sub-problem, consumed on advance.
    pub current_synthesis: Option<String>,
    /// Phase to re-enter after Paused/Clarifying.
    pub resume_phase: Option<ExecutionPhase>,
    /// Final cross-sub-problem action plan, present once complete.
    pub final_plan: Option<String>,
}

impl ExecutionState {
    pub fn new(session_id: SessionId, owner: impl Into<String>, problem: Problem) -> Self {
        Self {
            session_id,
            owner: owner.into(),
            phase: ExecutionPhase::Decomposition,
            round: 0,
            sub_problem_index: 0,
            problem,
            contributions: Vec::new(),
            contribution_total: 0,
            round_summaries: Vec::new(),
            results: Vec::new(),
            pending_clarification: None,
            stopped: false,
            stop_reason: None,
            guidance: Vec::new(),
            limited_context_mode: false,
            expert_panel: Vec::new(),
            expert_memories: BTreeMap::new(),
            metrics: DeliberationMetrics::default(),
            sub_problem_started_at: None,
            votes: Vec::new(),
            current_synthesis: None,
            resume_phase: None,
            final_plan: None,
        }
    }

    pub fn current_sub_problem(&self) -> Option<&SubProblem> {
        self.problem.sub_problem(self.sub_problem_index)
    }

    pub fn current_sub_problem_mut(&mut self) -> Option<&mut SubProblem> {
        self.problem.sub_problems.get_mut(self.sub_problem_index)
    }

    pub fn contributions_for_round(&self, round: usize) -> Vec<&Contribution> {
        self.contributions.iter().filter(|c| c.round == round).collect()
    }

    pub fn has_summary_for_round(&self, round: usize) -> bool {
        self.round_summaries.iter().any(|s| s.round == round)
    }

    /// Drop raw contributions from rounds that already have a summary,
    /// except the current round. Bounds memory over long deliberations while
    /// keeping the final round's raw transcript available for synthesis.
    pub fn prune_summarized_contributions(&mut self) {
        let round = self.round;
        let summarized: Vec<usize> = self.round_summaries.iter().map(|s| s.round).collect();
        self.contributions
            .retain(|c| c.round == round || !summarized.contains(&c.round));
    }

    /// Drop contributions from rounds that never produced a summary. Applied
    /// when a run is aborted mid-round: partial output of the aborted round
    /// is discarded, never persisted.
    pub fn discard_unsummarized_contributions(&mut self) {
        let summarized: Vec<usize> = self.round_summaries.iter().map(|s| s.round).collect();
        self.contributions
            .retain(|c| summarized.contains(&c.round));
    }

    pub fn mark_stopped(&mut self, reason: StopReason) {
        self.stopped = true;
        self.stop_reason = Some(reason);
    }

    pub fn clear_stop(&mut self) {
        self.stopped = false;
        self.stop_reason = None;
    }

    /// Reset round-scoped state when moving to the next sub-problem.
    pub fn reset_for_next_sub_problem(&mut self) {
        self.round = 0;
        self.contributions.clear();
        self.contribution_total = 0;
        self.round_summaries.clear();
        self.guidance.clear();
        self.expert_panel.clear();
        self.sub_problem_started_at = None;
        self.votes.clear();
        self.current_synthesis = None;
    }

    /// Sum of costs already attributed to completed sub-problems.
    pub fn attributed_cost(&self) -> f64 {
        self.results.iter().map(|r| r.cost).sum()
    }

    /// Externally visible status derived from phase and stop state.
    pub fn status(&self) -> SessionStatus {
        match self.phase {
            ExecutionPhase::Complete => SessionStatus::Completed,
            ExecutionPhase::Killed => SessionStatus::Killed,
            ExecutionPhase::Errored => SessionStatus::Errored,
            ExecutionPhase::Paused => SessionStatus::Paused,
            ExecutionPhase::Clarifying => SessionStatus::WaitingForClarification,
            _ => SessionStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::contribution::{Contribution, ContributionKind};
    use crate::deliberation::round::{RoundPhase, RoundSummary};

    fn state_with_problem() -> ExecutionState {
        let mut problem = Problem::new("Migrate", "Move the stack to the cloud");
        problem.sub_problems.push(SubProblem::new("sp-1", "Pick a provider", 4));
        problem.sub_problems.push(SubProblem::new("sp-2", "Plan the cutover", 7));
        ExecutionState::new(SessionId::new("sess-test"), "user-1", problem)
    }

    fn contribution(round: usize) -> Contribution {
        Contribution::new("cto", "CTO", "text", ContributionKind::Response, round)
    }

    #[test]
    fn test_current_sub_problem_follows_index() {
        let mut state = state_with_problem();
        assert_eq!(state.current_sub_problem().unwrap().id, "sp-1");
        state.sub_problem_index = 1;
        assert_eq!(state.current_sub_problem().unwrap().id, "sp-2");
        state.sub_problem_index = 2;
        assert!(state.current_sub_problem().is_none());
    }

    #[test]
    fn test_prune_keeps_current_and_unsummarized_rounds() {
        let mut state = state_with_problem();
        state.round = 3;
        state.contributions.push(contribution(1));
        state.contributions.push(contribution(2));
        state.contributions.push(contribution(3));
        state
            .round_summaries
            .push(RoundSummary::new(1, RoundPhase::Exploration, "r1"));
        // Round 2 has no summary yet; round 3 is current.
        state.prune_summarized_contributions();
        let rounds: Vec<usize> = state.contributions.iter().map(|c| c.round).collect();
        assert_eq!(rounds, vec![2, 3]);
    }

    #[test]
    fn test_discard_drops_rounds_without_a_summary() {
        let mut state = state_with_problem();
        state.round = 2;
        state.contributions.push(contribution(1));
        state.contributions.push(contribution(2));
        state
            .round_summaries
            .push(RoundSummary::new(1, RoundPhase::Exploration, "r1"));
        // Round 2 was aborted before its summary.
        state.discard_unsummarized_contributions();
        let rounds: Vec<usize> = state.contributions.iter().map(|c| c.round).collect();
        assert_eq!(rounds, vec![1]);
    }

    #[test]
    fn test_reset_for_next_sub_problem_keeps_results_and_memories() {
        let mut state = state_with_problem();
        state.round = 2;
        state.contributions.push(contribution(1));
        state
            .round_summaries
            .push(RoundSummary::new(1, RoundPhase::Exploration, "r1"));
        state.guidance.push("be concrete".to_string());
        state
            .expert_memories
            .insert("cto".to_string(), "prefers buy over build".to_string());
        state.results.push(crate::deliberation::result::SubProblemResult::new("sp-1", "done"));

        state.reset_for_next_sub_problem();
        assert_eq!(state.round, 0);
        assert!(state.contributions.is_empty());
        assert!(state.round_summaries.is_empty());
        assert!(state.guidance.is_empty());
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.expert_memories.len(), 1);
    }

    #[test]
    fn test_status_derivation() {
        let mut state = state_with_problem();
        assert_eq!(state.status(), SessionStatus::Running);
        state.phase = ExecutionPhase::Clarifying;
        assert_eq!(state.status(), SessionStatus::WaitingForClarification);
        state.phase = ExecutionPhase::Killed;
        assert_eq!(state.status(), SessionStatus::Killed);
        assert!(state.phase.is_terminal());
    }
}
