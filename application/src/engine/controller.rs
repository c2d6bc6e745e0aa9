//! Phase controller: the session state machine
//!
//! Drives one session from intake to completion. A single logical owner runs
//! the machine sequentially; the only parallelism is the fan-out inside a
//! round (contributions, vote calls, memory summaries). State is persisted
//! as one unit after every transition, and every exactly-once side effect is
//! guarded by [`CheckpointGuard`] so resume never redoes completed work.

use crate::config::EngineConfig;
use crate::engine::checkpoint::CheckpointGuard;
use crate::engine::emitter::SessionEventEmitter;
use crate::engine::generator::{ContributionGenerator, RoundContext, call_with_policy};
use crate::engine::prompts;
use crate::engine::quality::QualityGate;
use crate::engine::watchdog::{ProgressEvent, ProgressSender};
use crate::error::EngineError;
use crate::ports::context_store::{ArtifactKind, ContextStore};
use crate::ports::embedding::EmbeddingService;
use crate::ports::event_sink::EventSink;
use crate::ports::model_gateway::{ModelGateway, ModelOutput, ModelRequest};
use crate::ports::persona_store::PersonaStore;
use crate::ports::research_cache::{ResearchCache, ResearchFinding};
use crate::ports::state_store::{CheckpointStore, SessionStateStore};
use chrono::Utc;
use conclave_domain::{
    ComplexityEstimator, ExecutionPhase, ExecutionState, ExpertVote, PendingClarification,
    PersonaProfile, RoundPhase, RoundSummary, SessionId, SessionStatus, StopReason, SubProblem,
    SubProblemResult, TransitionKind, parsing,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Marker experts can put in a contribution to request background research.
const RESEARCH_MARKER: &str = "RESEARCH NEEDED:";

/// All ports the engine consumes, injected at construction.
#[derive(Clone)]
pub struct EngineDeps {
    pub gateway: Arc<dyn ModelGateway>,
    pub personas: Arc<dyn PersonaStore>,
    pub context: Arc<dyn ContextStore>,
    pub embeddings: Arc<dyn EmbeddingService>,
    pub research: Arc<dyn ResearchCache>,
    pub state_store: Arc<dyn SessionStateStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub sink: Arc<dyn EventSink>,
}

pub struct PhaseController {
    deps: EngineDeps,
    config: EngineConfig,
    emitter: SessionEventEmitter,
    generator: ContributionGenerator,
    quality: QualityGate,
}

impl PhaseController {
    pub fn new(deps: EngineDeps, config: EngineConfig, session_id: SessionId) -> Self {
        let emitter = SessionEventEmitter::new(session_id, Arc::clone(&deps.sink));
        let generator = ContributionGenerator::new(Arc::clone(&deps.gateway), &config);
        let quality = QualityGate::new(Arc::clone(&deps.embeddings), &config);
        Self {
            deps,
            config,
            emitter,
            generator,
            quality,
        }
    }

    pub fn emitter(&self) -> &SessionEventEmitter {
        &self.emitter
    }

    /// Run the state machine until it completes, suspends or fails.
    ///
    /// Interrupts (pause/kill/clarify) are external field mutations observed
    /// here, at phase boundaries, never separate execution threads.
    pub async fn run(
        &self,
        state: &mut ExecutionState,
        progress: ProgressSender,
    ) -> Result<(), EngineError> {
        loop {
            self.observe_external_stop(state).await?;
            if state.phase.is_terminal() || state.phase.is_suspended() {
                break;
            }

            let phase = state.phase;
            self.emitter
                .emit(TransitionKind::PhaseStarted {
                    phase: phase.as_str().to_string(),
                })
                .await;

            match self.step(state, &progress).await {
                Ok(()) => {
                    self.emitter
                        .emit(TransitionKind::PhaseEnded {
                            phase: phase.as_str().to_string(),
                        })
                        .await;
                    // A stop issued while the step ran must be folded in
                    // before this persist rewrites the stored status.
                    self.observe_external_stop(state).await?;
                    self.persist(state).await?;
                }
                Err(e) => return self.fail(state, e).await,
            }
        }
        self.persist(state).await?;
        Ok(())
    }

    async fn step(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        match state.phase {
            ExecutionPhase::Decomposition => self.phase_decomposition(state, progress).await,
            ExecutionPhase::ContextCollection => self.phase_context_collection(state, progress).await,
            ExecutionPhase::GapCheck => self.phase_gap_check(state).await,
            ExecutionPhase::Selection => self.phase_selection(state, progress).await,
            ExecutionPhase::InitialRound | ExecutionPhase::ParallelRound => {
                self.phase_round(state, progress).await
            }
            ExecutionPhase::Voting => self.phase_voting(state, progress).await,
            ExecutionPhase::Synthesis => self.phase_synthesis(state, progress).await,
            ExecutionPhase::NextSubProblem => self.phase_next_sub_problem(state).await,
            ExecutionPhase::MetaSynthesis => self.phase_meta_synthesis(state, progress).await,
            // Terminal and suspended phases never reach step()
            _ => Ok(()),
        }
    }

    /// External commands mutate only store-side status; pick them up here.
    async fn observe_external_stop(&self, state: &mut ExecutionState) -> Result<(), EngineError> {
        if state.phase.is_terminal() {
            return Ok(());
        }
        let metadata = self
            .deps
            .state_store
            .load_metadata(&state.session_id)
            .await?;
        let Some(metadata) = metadata else {
            return Ok(());
        };
        match metadata.status {
            SessionStatus::Killed if state.phase != ExecutionPhase::Killed => {
                info!("Session {} observed external kill", state.session_id);
                state.phase = ExecutionPhase::Killed;
                state.mark_stopped(StopReason::Killed);
            }
            SessionStatus::Paused if !state.phase.is_suspended() => {
                info!("Session {} observed external pause", state.session_id);
                state.resume_phase = Some(state.phase);
                state.phase = ExecutionPhase::Paused;
                state.mark_stopped(StopReason::Paused);
            }
            _ => {}
        }
        Ok(())
    }

    /// Mark the session Errored with an error-kind tag. Operators get the
    /// verbatim error in the log; the event carries the sanitized message.
    async fn fail(&self, state: &mut ExecutionState, e: EngineError) -> Result<(), EngineError> {
        if matches!(e, EngineError::Permission(_)) {
            return Err(e);
        }
        error!("Session {} failed in {}: {}", state.session_id, state.phase, e);
        state.phase = ExecutionPhase::Errored;
        state.mark_stopped(StopReason::Errored {
            kind: e.kind_tag().to_string(),
        });
        self.emitter
            .emit(TransitionKind::Error {
                error_kind: e.kind_tag().to_string(),
                message: e.user_message().to_string(),
            })
            .await;
        if let Err(persist_err) = self.persist(state).await {
            warn!(
                "Session {}: could not persist errored state: {}",
                state.session_id, persist_err
            );
        }
        Err(e)
    }

    pub async fn persist(&self, state: &ExecutionState) -> Result<(), EngineError> {
        self.deps.state_store.save(state).await?;
        Ok(())
    }

    // ==================== Phases ====================

    async fn phase_decomposition(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        if state.problem.sub_problems.is_empty() {
            let prompt = prompts::decomposition(
                &state.problem.title,
                &state.problem.description,
                &state.problem.context,
                self.config.max_sub_problems,
            );
            let output = self.call(ModelRequest::new(prompt)).await?;
            state.metrics.record("decomposition", output.usage);

            let mut subs = parsing::parse_decomposition(&output.content);
            if subs.is_empty() {
                return Err(EngineError::Fatal(
                    "decomposition produced no sub-problems".to_string(),
                ));
            }
            // Over-decomposition measurably reduces output quality.
            if subs.len() > self.config.max_sub_problems {
                warn!(
                    "Session {}: decomposition produced {} sub-problems, truncating to {}",
                    state.session_id,
                    subs.len(),
                    self.config.max_sub_problems
                );
                subs.truncate(self.config.max_sub_problems);
            }
            state.problem.sub_problems = subs;
        } else {
            debug!(
                "Session {}: decomposition already present, skipping",
                state.session_id
            );
        }

        let mut estimator = ComplexityEstimator::new(self.config.complexity.clone());
        if let Some(n) = self.config.expert_override {
            estimator = estimator.with_expert_override(n);
        }
        let assessment = estimator.assess(&state.problem.sub_problems);
        info!(
            "Session {}: complexity {:.2} -> {} experts, {} rounds",
            state.session_id,
            assessment.score,
            assessment.recommended_experts,
            assessment.recommended_rounds
        );
        state.metrics.recommended_experts = assessment.recommended_experts;
        state.metrics.recommended_rounds = assessment.recommended_rounds;
        state.metrics.complexity = Some(assessment);

        progress.send(ProgressEvent::DecompositionCompleted);
        state.phase = ExecutionPhase::ContextCollection;
        Ok(())
    }

    /// Pure data assembly in deterministic order: business context, then
    /// personalization profile, then referenced artifacts per category.
    /// Zero cost: no model call is made here.
    async fn phase_context_collection(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        let saved = self.deps.context.load_saved(&state.owner).await?;
        if let Some(business) = saved.business_context {
            state
                .problem
                .append_context(&format!("Business context:\n{}", business));
        }
        if let Some(profile) = saved.personalization {
            state
                .problem
                .append_context(&format!("Personalization profile:\n{}", profile));
        }

        let artifacts = self.deps.context.referenced_artifacts(&state.owner).await?;
        for kind in ArtifactKind::ALL {
            let mut kept = 0;
            for artifact in artifacts.iter().filter(|a| a.kind == kind) {
                if kept >= self.config.artifact_cap {
                    debug!(
                        "Session {}: dropping excess {} artifacts",
                        state.session_id,
                        kind.as_str()
                    );
                    break;
                }
                state.problem.append_context(&format!(
                    "Referenced {} \"{}\":\n{}",
                    kind.as_str(),
                    artifact.title,
                    artifact.content
                ));
                kept += 1;
            }
        }

        progress.send(ProgressEvent::ContextCompleted);
        state.phase = ExecutionPhase::GapCheck;
        Ok(())
    }

    async fn phase_gap_check(&self, state: &mut ExecutionState) -> Result<(), EngineError> {
        // Resume path: a clarification is outstanding.
        if let Some(mut pending) = state.pending_clarification.take() {
            let unanswered = pending.unanswered();
            if unanswered.is_empty() {
                let mut block = String::from("Clarifications:");
                for (question, answer) in pending.qa_pairs() {
                    block.push_str(&format!("\nQ: {}\nA: {}", question, answer));
                }
                state.limited_context_mode = pending.has_degraded_answer();
                if state.limited_context_mode {
                    warn!(
                        "Session {}: clarification answers were thin, enabling limited-context mode",
                        state.session_id
                    );
                }
                state.problem.append_context(&block);
                state.clear_stop();
                self.emitter
                    .emit(TransitionKind::ClarificationAnswered { remaining: 0 })
                    .await;
                state.phase = ExecutionPhase::Selection;
            } else {
                // Re-suspend with only the unanswered subset.
                let remaining = unanswered.len();
                pending.questions = unanswered;
                state.pending_clarification = Some(pending);
                self.emitter
                    .emit(TransitionKind::ClarificationAnswered { remaining })
                    .await;
                self.suspend_for_clarification(state);
            }
            return Ok(());
        }

        // Fresh analysis.
        let prompt = prompts::gap_check(
            &state.problem.title,
            &state.problem.context,
            &state.problem.sub_problems,
        );
        let output = self.call(ModelRequest::new(prompt)).await?;
        state.metrics.record("gap_check", output.usage);

        let gaps = parsing::parse_gaps(&output.content);
        let critical: Vec<_> = gaps
            .iter()
            .filter(|g| g.priority.is_critical())
            .cloned()
            .collect();

        if critical.is_empty() {
            for gap in &gaps {
                state
                    .problem
                    .append_context(&format!("Open question (non-blocking): {}", gap.question));
            }
            state.phase = ExecutionPhase::Selection;
            return Ok(());
        }

        info!(
            "Session {}: {} critical information gaps, suspending",
            state.session_id,
            critical.len()
        );
        let count = critical.len();
        state.pending_clarification = Some(PendingClarification::new(critical));
        self.emitter
            .emit(TransitionKind::ClarificationRequested {
                question_count: count,
            })
            .await;
        self.suspend_for_clarification(state);
        Ok(())
    }

    fn suspend_for_clarification(&self, state: &mut ExecutionState) {
        state.resume_phase = Some(ExecutionPhase::GapCheck);
        state.phase = ExecutionPhase::Clarifying;
        state.mark_stopped(StopReason::AwaitingClarification);
    }

    async fn phase_selection(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        if state.expert_panel.is_empty() {
            let codes = self.deps.personas.available_codes().await?;
            if codes.is_empty() {
                return Err(EngineError::Fatal("persona catalog is empty".to_string()));
            }
            let target = state
                .metrics
                .recommended_experts
                .max(self.config.complexity.min_experts)
                .min(codes.len());
            state.expert_panel = codes.into_iter().take(target).collect();
            for code in &state.expert_panel {
                debug!("Session {}: selected persona {}", state.session_id, code);
                progress.send(ProgressEvent::PersonaSelected);
            }
        }
        if state.sub_problem_started_at.is_none() {
            state.sub_problem_started_at = Some(Utc::now());
        }
        progress.send(ProgressEvent::SubProblemStarted);
        progress.send(ProgressEvent::SelectionCompleted);
        state.phase = ExecutionPhase::InitialRound;
        Ok(())
    }

    async fn phase_round(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        let round = state.round + 1;
        let max_rounds = state.metrics.recommended_rounds.max(1);
        // The initial round always runs under Exploration rules.
        let phase = if state.phase == ExecutionPhase::InitialRound {
            RoundPhase::Exploration
        } else {
            RoundPhase::for_round(round, max_rounds)
        };

        // One generation pass per round number, ever.
        if CheckpointGuard::round_already_generated(state, round) {
            info!(
                "Session {}: round {} already generated, advancing control fields only",
                state.session_id, round
            );
        } else {
            let panel = self.resolve_panel(state).await?;
            let panel = order_by_novelty(panel, state);
            let ctx = self.round_context(state, round, phase).await;

            let report = self.generator.generate(&panel, &ctx).await?;
            state.metrics.record(&format!("round-{}", round), report.usage);

            let outcome = self.quality.review(report.contributions).await?;
            if outcome.removed_duplicates > 0 {
                self.emitter
                    .emit(TransitionKind::QualityIssue {
                        round,
                        detail: format!("{} near-duplicate contributions removed", outcome.removed_duplicates),
                    })
                    .await;
            }
            for feedback in outcome.feedback {
                self.emitter
                    .emit(TransitionKind::QualityIssue {
                        round,
                        detail: feedback.clone(),
                    })
                    .await;
                state.guidance.push(feedback);
            }
            for c in &outcome.kept {
                self.emitter
                    .emit(TransitionKind::ContributionProduced {
                        persona_code: c.persona_code.clone(),
                        round,
                    })
                    .await;
                progress.send(ProgressEvent::ContributionProduced);
            }
            state.contribution_total += outcome.kept.len();
            state.contributions.extend(outcome.kept);
        }
        state.round = round;

        // Exactly one summary per round.
        if !CheckpointGuard::round_already_summarized(state, round) {
            let transcript = self.round_transcript(state, round);
            let output = self
                .call(ModelRequest::new(prompts::round_summary(round, phase, &transcript)))
                .await?;
            state.metrics.record(&format!("round-{}", round), output.usage);
            state
                .round_summaries
                .push(RoundSummary::new(round, phase, output.content));
        }

        self.flag_research_needs(state, round).await;
        state.prune_summarized_contributions();

        state.phase = if round >= max_rounds {
            ExecutionPhase::Voting
        } else {
            ExecutionPhase::ParallelRound
        };
        Ok(())
    }

    async fn phase_voting(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        if state.votes.is_empty() {
            let panel = self.resolve_panel(state).await?;
            let goal = state
                .current_sub_problem()
                .map(|sp| sp.goal.clone())
                .unwrap_or_else(|| state.problem.title.clone());
            let prompt = prompts::vote(&goal, &state.round_summaries);

            let mut join_set = JoinSet::new();
            for persona in panel {
                let request = ModelRequest::new(prompt.clone())
                    .with_system(prompts::persona_system(&persona));
                let gateway = Arc::clone(&self.deps.gateway);
                let retry = self.config.retry.clone();
                let timeout = self.config.call_timeout;
                join_set.spawn(async move {
                    let result = call_with_policy(&gateway, &retry, timeout, request).await;
                    (persona, result)
                });
            }

            let mut votes: Vec<ExpertVote> = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                let (persona, result) =
                    joined.map_err(|e| EngineError::Fatal(format!("task join: {}", e)))?;
                let output = result?;
                state.metrics.record("voting", output.usage);
                votes.push(parsing::parse_vote(&persona.code, &output.content));
            }
            // Stable order regardless of join order.
            votes.sort_by(|a, b| {
                let pos = |code: &str| {
                    state
                        .expert_panel
                        .iter()
                        .position(|c| c == code)
                        .unwrap_or(usize::MAX)
                };
                pos(&a.persona_code).cmp(&pos(&b.persona_code))
            });
            state.votes = votes;
        }

        progress.send(ProgressEvent::VotingCompleted);
        state.phase = ExecutionPhase::Synthesis;
        Ok(())
    }

    async fn phase_synthesis(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        if state.current_synthesis.is_none() {
            let goal = state
                .current_sub_problem()
                .map(|sp| sp.goal.clone())
                .unwrap_or_else(|| state.problem.title.clone());
            let final_round = self.round_transcript(state, state.round);
            let votes_text: Vec<String> = state
                .votes
                .iter()
                .map(|v| {
                    format!(
                        "{} ({:.0}% confident): {} — {}",
                        v.persona_code,
                        v.confidence * 100.0,
                        v.recommendation,
                        v.reasoning
                    )
                })
                .collect();
            let prompt = prompts::synthesis(
                &goal,
                &state.round_summaries,
                &final_round,
                &votes_text.join("\n"),
                state.limited_context_mode,
            );
            let output = self.call(ModelRequest::new(prompt)).await?;
            state.metrics.record("synthesis", output.usage);

            let mut text = output.content;
            if output.truncated || parsing::looks_truncated(&text) {
                // Never more than one continuation per synthesis.
                info!(
                    "Session {}: synthesis truncated, issuing one continuation",
                    state.session_id
                );
                let tail: String = text
                    .chars()
                    .rev()
                    .take(200)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                let continuation = self
                    .call(
                        ModelRequest::new(prompts::continuation(&tail))
                            .with_max_tokens(self.config.continuation_max_tokens),
                    )
                    .await?;
                state.metrics.record("synthesis", continuation.usage);
                text.push_str(&continuation.content);
            }
            state.current_synthesis = Some(text);
        }

        progress.send(ProgressEvent::SynthesisCompleted);
        state.phase = ExecutionPhase::NextSubProblem;
        Ok(())
    }

    async fn phase_next_sub_problem(&self, state: &mut ExecutionState) -> Result<(), EngineError> {
        let sub = state
            .current_sub_problem()
            .ok_or_else(|| {
                EngineError::Fatal(format!(
                    "sub-problem index {} out of range",
                    state.sub_problem_index
                ))
            })?
            .clone();

        if CheckpointGuard::sub_problem_completed(state, &sub.id) {
            info!(
                "Session {}: sub-problem {} already completed, advancing control fields only",
                state.session_id, sub.id
            );
        } else {
            let (memories, memory_usage) = self.summarize_memories(state).await?;
            state.metrics.record("memory", memory_usage);
            state.expert_memories.extend(memories.clone());

            // Cost attributed to this sub-problem: running total minus what
            // earlier results already claimed. The delta is never negative.
            let mut cost = state.metrics.total_cost - state.attributed_cost();
            if cost < 0.0 {
                warn!(
                    "Session {}: negative cost delta {:.6} clamped to zero",
                    state.session_id, cost
                );
                cost = 0.0;
            }
            let duration = state
                .sub_problem_started_at
                .map(|t| (Utc::now() - t).to_std().unwrap_or_default())
                .unwrap_or_default();

            let result = SubProblemResult {
                sub_problem_id: sub.id.clone(),
                synthesis: state.current_synthesis.clone().unwrap_or_default(),
                votes: state.votes.clone(),
                contribution_count: state.contribution_total,
                cost,
                duration,
                expert_panel: state.expert_panel.clone(),
                expert_memories: memories,
            };
            state.results.push(result);

            self.emitter
                .emit(TransitionKind::SubProblemComplete {
                    sub_problem_id: sub.id.clone(),
                    index: state.sub_problem_index,
                })
                .await;

            // Lagging durable checkpoint; best-effort by design.
            if let Err(e) = self
                .deps
                .checkpoints
                .record(&state.session_id, state.sub_problem_index)
                .await
            {
                warn!(
                    "Session {}: durable checkpoint write failed: {}",
                    state.session_id, e
                );
            }
        }

        state.sub_problem_index += 1;
        state.reset_for_next_sub_problem();
        state.phase = if state.sub_problem_index >= state.problem.sub_problems.len() {
            ExecutionPhase::MetaSynthesis
        } else {
            ExecutionPhase::Selection
        };
        Ok(())
    }

    async fn phase_meta_synthesis(
        &self,
        state: &mut ExecutionState,
        progress: &ProgressSender,
    ) -> Result<(), EngineError> {
        if state.final_plan.is_none() {
            let prompt = prompts::meta_synthesis(&state.problem.title, &state.results);
            let output = self.call(ModelRequest::new(prompt)).await?;
            state.metrics.record("meta_synthesis", output.usage);
            state.final_plan = Some(output.content);
        }
        self.emitter.emit(TransitionKind::MetaSynthesisComplete).await;
        progress.send(ProgressEvent::SynthesisCompleted);
        state.phase = ExecutionPhase::Complete;
        info!("Session {} complete", state.session_id);
        Ok(())
    }

    // ==================== Helpers ====================

    async fn call(&self, request: ModelRequest) -> Result<ModelOutput, EngineError> {
        call_with_policy(
            &self.deps.gateway,
            &self.config.retry,
            self.config.call_timeout,
            request,
        )
        .await
    }

    async fn resolve_panel(
        &self,
        state: &ExecutionState,
    ) -> Result<Vec<PersonaProfile>, EngineError> {
        let mut panel = Vec::with_capacity(state.expert_panel.len());
        for code in &state.expert_panel {
            let profile = self.deps.personas.resolve(code).await?.ok_or_else(|| {
                EngineError::Fatal(format!("unknown persona code: {}", code))
            })?;
            panel.push(profile);
        }
        if panel.is_empty() {
            return Err(EngineError::Fatal("empty expert panel".to_string()));
        }
        Ok(panel)
    }

    async fn round_context(
        &self,
        state: &ExecutionState,
        round: usize,
        phase: RoundPhase,
    ) -> RoundContext {
        let sub = state.current_sub_problem();
        let goal = sub
            .map(|sp| sp.goal.clone())
            .unwrap_or_else(|| state.problem.title.clone());
        let mut context = state.problem.context.clone();
        if let Some(sp) = sub
            && !sp.context().is_empty()
        {
            context.push_str("\n\n");
            context.push_str(sp.context());
        }
        let dependency_context = sub
            .map(|sp| self.dependency_context(state, sp))
            .unwrap_or_default();
        let research = self.relevant_research(&goal).await;

        RoundContext {
            round,
            phase,
            goal,
            context,
            dependency_context,
            summaries: state.round_summaries.clone(),
            guidance: state.guidance.clone(),
            memories: state.expert_memories.clone(),
            research,
        }
    }

    /// Syntheses of the sub-problems this one depends on.
    fn dependency_context(&self, state: &ExecutionState, sub: &SubProblem) -> String {
        sub.depends_on
            .iter()
            .filter_map(|dep_id| {
                state
                    .results
                    .iter()
                    .find(|r| &r.sub_problem_id == dep_id)
                    .map(|r| format!("[{}] {}", r.sub_problem_id, r.synthesis))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Best-effort research cache lookup; failures degrade to no findings.
    async fn relevant_research(&self, goal: &str) -> Vec<String> {
        let embedding = match self.deps.embeddings.embed(goal).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Research lookup skipped, embedding failed: {}", e);
                return Vec::new();
            }
        };
        match self
            .deps
            .research
            .lookup(&embedding, None, None, self.config.research_lookup_limit)
            .await
        {
            Ok(findings) => findings
                .into_iter()
                .map(|f| format!("{}: {}", f.question, f.findings))
                .collect(),
            Err(e) => {
                warn!("Research lookup failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Proactive research: experts can flag open questions; flagged ones go
    /// into the cache as open findings for later sessions. Best-effort.
    async fn flag_research_needs(&self, state: &ExecutionState, round: usize) {
        for c in state.contributions_for_round(round) {
            for line in c.content.lines() {
                let Some(question) = line.trim().strip_prefix(RESEARCH_MARKER) else {
                    continue;
                };
                let question = question.trim();
                if question.is_empty() {
                    continue;
                }
                debug!(
                    "Session {}: research flagged in round {}: {}",
                    state.session_id, round, question
                );
                let Ok(embedding) = self.deps.embeddings.embed(question).await else {
                    continue;
                };
                let finding = ResearchFinding {
                    question: question.to_string(),
                    findings: String::new(),
                    category: None,
                    industry: None,
                };
                if let Err(e) = self
                    .deps
                    .research
                    .store(finding, embedding, self.config.research_ttl)
                    .await
                {
                    warn!("Research flag write failed: {}", e);
                }
            }
        }
    }

    fn round_transcript(&self, state: &ExecutionState, round: usize) -> String {
        state
            .contributions_for_round(round)
            .iter()
            .map(|c| format!("{}:\n{}", c.persona_name, c.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Per-expert memory summaries, fanned out and joined. Returns the
    /// summaries with the usage the batch accumulated.
    async fn summarize_memories(
        &self,
        state: &ExecutionState,
    ) -> Result<(BTreeMap<String, String>, conclave_domain::CallUsage), EngineError> {
        let mut join_set = JoinSet::new();
        for code in &state.expert_panel {
            let texts: Vec<String> = state
                .contributions
                .iter()
                .filter(|c| &c.persona_code == code)
                .map(|c| c.content.clone())
                .collect();
            if texts.is_empty() {
                continue;
            }
            let name = state
                .contributions
                .iter()
                .find(|c| &c.persona_code == code)
                .map(|c| c.persona_name.clone())
                .unwrap_or_else(|| code.clone());
            let request =
                ModelRequest::new(prompts::memory_summary(&name, &texts.join("\n\n")));
            let gateway = Arc::clone(&self.deps.gateway);
            let retry = self.config.retry.clone();
            let timeout = self.config.call_timeout;
            let code = code.clone();
            join_set.spawn(async move {
                let result = call_with_policy(&gateway, &retry, timeout, request).await;
                (code, result)
            });
        }

        let mut memories = BTreeMap::new();
        let mut usage = conclave_domain::CallUsage::default();
        while let Some(joined) = join_set.join_next().await {
            let (code, result) =
                joined.map_err(|e| EngineError::Fatal(format!("task join: {}", e)))?;
            let output = result?;
            usage.add(output.usage);
            memories.insert(code, output.content);
        }
        Ok((memories, usage))
    }
}

/// Order the panel for a round: experts with fewer prior contributions come
/// first, favoring novel voices; ties break on code for determinism. The
/// generator returns contributions in panel order, so this is also the
/// transcript order the round summary sees.
fn order_by_novelty(mut panel: Vec<PersonaProfile>, state: &ExecutionState) -> Vec<PersonaProfile> {
    let count = |code: &str| {
        state
            .contributions
            .iter()
            .filter(|c| c.persona_code == code)
            .count()
    };
    panel.sort_by(|a, b| count(&a.code).cmp(&count(&b.code)).then(a.code.cmp(&b.code)));
    panel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ports::context_store::SavedContext;
    use crate::ports::embedding::EmbeddingError;
    use crate::ports::event_sink::SinkError;
    use crate::ports::model_gateway::GatewayError;
    use crate::ports::state_store::{SessionMetadata, StoreError};
    use conclave_domain::{CallUsage, Problem, TransitionEvent};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Routes each prompt to a canned response by phase-specific wording.
    struct ScriptedGateway {
        calls: AtomicUsize,
        continuation_calls: AtomicUsize,
        critical_gap: bool,
        two_critical_gaps: bool,
        single_sub_problem: bool,
        truncate_synthesis: bool,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                continuation_calls: AtomicUsize::new(0),
                critical_gap: false,
                two_critical_gaps: false,
                single_sub_problem: false,
                truncate_synthesis: false,
            }
        }

        fn with_critical_gap(mut self) -> Self {
            self.critical_gap = true;
            self
        }

        fn with_two_critical_gaps(mut self) -> Self {
            self.two_critical_gaps = true;
            self
        }

        fn with_single_sub_problem(mut self) -> Self {
            self.single_sub_problem = true;
            self
        }

        fn with_truncated_synthesis(mut self) -> Self {
            self.truncate_synthesis = true;
            self
        }
    }

    #[async_trait::async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn complete(&self, request: ModelRequest) -> Result<ModelOutput, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &request.prompt;
            let content = if prompt.starts_with("Decompose the following problem") {
                if self.single_sub_problem {
                    r#"[{"id": "sp-1", "goal": "Pick the market", "complexity": 2, "depends_on": []}]"#
                        .to_string()
                } else {
                    r#"[
                        {"id": "sp-1", "goal": "Pick the market", "complexity": 4, "depends_on": []},
                        {"id": "sp-2", "goal": "Plan the launch", "complexity": 6, "depends_on": ["sp-1"]}
                    ]"#
                    .to_string()
                }
            } else if prompt.starts_with("Identify missing information") {
                if self.two_critical_gaps {
                    "CRITICAL: What is the budget? | sizing depends on it\n\
                     CRITICAL: Which regions are in scope? | panel choice depends on it"
                        .to_string()
                } else if self.critical_gap {
                    "CRITICAL: What is the budget? | sizing depends on it".to_string()
                } else {
                    "OPTIONAL: Any brand constraints? | nice to know".to_string()
                }
            } else if prompt.contains("Give your final position as") {
                r#"{"recommendation": "Option A", "confidence": 0.8,
                    "reasoning": "Best tradeoff", "conditions": ["budget holds"]}"#
                    .to_string()
            } else if prompt.starts_with("Summarize round") {
                format!("Round summary {n}: broad agreement with one open risk.")
            } else if prompt.starts_with("Write the synthesis report") {
                if self.truncate_synthesis {
                    format!("Synthesis {n}: the recommendation is to")
                } else {
                    format!("Synthesis {n}: go with Option A, staged rollout.")
                }
            } else if prompt.starts_with("Your previous output was cut off") {
                self.continuation_calls.fetch_add(1, Ordering::SeqCst);
                " proceed with Option A.".to_string()
            } else if prompt.starts_with("Aggregate these sub-problem syntheses") {
                "Final plan: enter the market, then launch in stages.".to_string()
            } else if prompt.starts_with("Summarize the positions") {
                format!("Memory note {n}.")
            } else {
                // Expert contribution; distinct per call so dedup keeps all.
                format!(
                    "Point {n}: there is a risk in the assumption about demand. \
                     However the tradeoff favors acting.\nRECOMMENDATION: option {n}."
                )
            };
            Ok(ModelOutput::new(content, CallUsage::new(100, 0.001)))
        }
    }

    struct TestStateStore {
        entries: Mutex<HashMap<String, (serde_json::Value, SessionMetadata)>>,
    }

    impl TestStateStore {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionStateStore for TestStateStore {
        async fn save(&self, state: &ExecutionState) -> Result<(), StoreError> {
            let raw = serde_json::to_value(state)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.entries.lock().unwrap().insert(
                state.session_id.as_str().to_string(),
                (raw, SessionMetadata::from_state(state)),
            );
            Ok(())
        }

        async fn load_raw(&self, id: &SessionId) -> Result<Option<serde_json::Value>, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(id.as_str())
                .map(|(raw, _)| raw.clone()))
        }

        async fn load_metadata(&self, id: &SessionId) -> Result<Option<SessionMetadata>, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(id.as_str())
                .map(|(_, m)| m.clone()))
        }

        async fn update_status(
            &self,
            id: &SessionId,
            status: conclave_domain::SessionStatus,
        ) -> Result<(), StoreError> {
            let mut entries = self.entries.lock().unwrap();
            let (_, metadata) = entries
                .get_mut(id.as_str())
                .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;
            metadata.status = status;
            Ok(())
        }
    }

    struct TestCheckpointStore {
        records: Mutex<HashMap<String, usize>>,
    }

    #[async_trait::async_trait]
    impl CheckpointStore for TestCheckpointStore {
        async fn record(&self, id: &SessionId, index: usize) -> Result<(), StoreError> {
            self.records
                .lock()
                .unwrap()
                .insert(id.as_str().to_string(), index);
            Ok(())
        }

        async fn load(&self, id: &SessionId) -> Result<Option<usize>, StoreError> {
            Ok(self.records.lock().unwrap().get(id.as_str()).copied())
        }
    }

    struct EmptyContext;

    #[async_trait::async_trait]
    impl ContextStore for EmptyContext {
        async fn load_saved(&self, _owner: &str) -> Result<SavedContext, StoreError> {
            Ok(SavedContext::default())
        }

        async fn referenced_artifacts(
            &self,
            _owner: &str,
        ) -> Result<Vec<crate::ports::context_store::Artifact>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// One-hot vector per distinct text, so distinct texts never deduplicate.
    struct OrthogonalEmbedder {
        assignments: Mutex<HashMap<String, usize>>,
    }

    impl OrthogonalEmbedder {
        fn new() -> Self {
            Self {
                assignments: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl crate::ports::embedding::EmbeddingService for OrthogonalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut assignments = self.assignments.lock().unwrap();
            let next = assignments.len();
            let index = *assignments.entry(text.to_string()).or_insert(next);
            let mut v = vec![0.0; 512];
            v[index % 512] = 1.0;
            Ok(v)
        }
    }

    struct NoResearch;

    #[async_trait::async_trait]
    impl ResearchCache for NoResearch {
        async fn lookup(
            &self,
            _embedding: &[f32],
            _category: Option<&str>,
            _industry: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<ResearchFinding>, StoreError> {
            Ok(Vec::new())
        }

        async fn store(
            &self,
            _finding: ResearchFinding,
            _embedding: Vec<f32>,
            _ttl: std::time::Duration,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct TestPersonas;

    #[async_trait::async_trait]
    impl PersonaStore for TestPersonas {
        async fn resolve(&self, code: &str) -> Result<Option<PersonaProfile>, StoreError> {
            Ok(["alpha", "bravo", "charlie"]
                .contains(&code)
                .then(|| PersonaProfile {
                    code: code.to_string(),
                    name: code.to_uppercase(),
                    role_prompt: format!("You are {code}."),
                }))
        }

        async fn available_codes(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec![
                "alpha".to_string(),
                "bravo".to_string(),
                "charlie".to_string(),
            ])
        }
    }

    struct CollectingSink {
        events: Mutex<Vec<TransitionEvent>>,
    }

    #[async_trait::async_trait]
    impl EventSink for CollectingSink {
        async fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn deps_with(gateway: ScriptedGateway) -> (EngineDeps, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink {
            events: Mutex::new(Vec::new()),
        });
        let deps = EngineDeps {
            gateway: Arc::new(gateway),
            personas: Arc::new(TestPersonas),
            context: Arc::new(EmptyContext),
            embeddings: Arc::new(OrthogonalEmbedder::new()),
            research: Arc::new(NoResearch),
            state_store: Arc::new(TestStateStore::new()),
            checkpoints: Arc::new(TestCheckpointStore {
                records: Mutex::new(HashMap::new()),
            }),
            sink: sink.clone(),
        };
        (deps, sink)
    }

    fn new_state(id: &str) -> ExecutionState {
        ExecutionState::new(
            SessionId::new(id.to_string()),
            "owner-1".to_string(),
            Problem::new("Market entry", "Should we enter the EU market next year?"),
        )
    }

    async fn run_to_end(deps: &EngineDeps, state: &mut ExecutionState) -> Result<(), EngineError> {
        deps.state_store.save(state).await.map_err(EngineError::from)?;
        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );
        controller.run(state, ProgressSender::disabled()).await
    }

    #[test]
    fn test_novelty_ordering_puts_quiet_experts_first() {
        use conclave_domain::{Contribution, ContributionKind};
        let mut state = new_state("novelty");
        for _ in 0..2 {
            state.contributions.push(Contribution::new(
                "alpha",
                "ALPHA",
                "text",
                ContributionKind::Initial,
                1,
            ));
        }
        state.contributions.push(Contribution::new(
            "bravo",
            "BRAVO",
            "text",
            ContributionKind::Initial,
            1,
        ));

        let panel = vec![
            PersonaProfile::new("alpha", "ALPHA", "p"),
            PersonaProfile::new("bravo", "BRAVO", "p"),
            PersonaProfile::new("charlie", "CHARLIE", "p"),
        ];
        let ordered = order_by_novelty(panel, &state);
        let codes: Vec<&str> = ordered.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["charlie", "bravo", "alpha"]);
    }

    #[tokio::test]
    async fn test_full_session_reaches_complete() {
        let (deps, sink) = deps_with(ScriptedGateway::new());
        let mut state = new_state("happy-path");

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert!(state.final_plan.as_deref().unwrap().contains("Final plan"));
        assert_eq!(state.results.len(), 2);
        assert_eq!(state.results[0].sub_problem_id, "sp-1");
        assert_eq!(state.results[1].sub_problem_id, "sp-2");
        // Every result has a full panel of votes and a synthesis.
        for result in &state.results {
            assert_eq!(result.votes.len(), 3);
            assert!(result.synthesis.starts_with("Synthesis"));
            assert!(result.contribution_count > 0);
        }

        // Sequence numbers are strictly increasing from 1.
        let events = sink.events.lock().unwrap();
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64 + 1);
        }
        assert!(
            events
                .iter()
                .any(|e| matches!(e.kind, TransitionKind::MetaSynthesisComplete))
        );
    }

    #[tokio::test]
    async fn test_cost_accounting_is_consistent() {
        let (deps, _sink) = deps_with(ScriptedGateway::new());
        let mut state = new_state("costs");

        run_to_end(&deps, &mut state).await.unwrap();

        assert!(state.metrics.total_cost > 0.0);
        let attributed: f64 = state.results.iter().map(|r| r.cost).sum();
        // Per-result cost never exceeds the running total, and every
        // per-phase record sums back to it.
        assert!(attributed <= state.metrics.total_cost + 1e-9);
        assert!((state.metrics.phase_cost_sum() - state.metrics.total_cost).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_critical_gap_suspends_session() {
        let (deps, sink) = deps_with(ScriptedGateway::new().with_critical_gap());
        let mut state = new_state("gap-suspend");

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Clarifying);
        assert_eq!(state.resume_phase, Some(ExecutionPhase::GapCheck));
        assert_eq!(state.stop_reason, Some(StopReason::AwaitingClarification));
        let pending = state.pending_clarification.as_ref().unwrap();
        assert_eq!(pending.questions.len(), 1);
        assert_eq!(pending.questions[0].question, "What is the budget?");
        assert!(sink.events.lock().unwrap().iter().any(|e| matches!(
            e.kind,
            TransitionKind::ClarificationRequested { question_count: 1 }
        )));
    }

    #[tokio::test]
    async fn test_answered_clarification_resumes_to_completion() {
        let (deps, _sink) = deps_with(ScriptedGateway::new().with_critical_gap());
        let mut state = new_state("gap-resume");
        run_to_end(&deps, &mut state).await.unwrap();
        assert_eq!(state.phase, ExecutionPhase::Clarifying);

        let mut answers = std::collections::BTreeMap::new();
        answers.insert(
            "What is the budget?".to_string(),
            "Up to 2M EUR for the first year".to_string(),
        );
        state
            .pending_clarification
            .as_mut()
            .unwrap()
            .submit_answers(answers);
        state.phase = state.resume_phase.take().unwrap();
        state.clear_stop();

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert!(!state.limited_context_mode);
        assert!(state.problem.context.contains("Up to 2M EUR"));
    }

    #[tokio::test]
    async fn test_thin_answer_enables_limited_context_mode() {
        let (deps, _sink) = deps_with(ScriptedGateway::new().with_critical_gap());
        let mut state = new_state("gap-thin");
        run_to_end(&deps, &mut state).await.unwrap();

        let mut answers = std::collections::BTreeMap::new();
        answers.insert("What is the budget?".to_string(), "idk".to_string());
        state
            .pending_clarification
            .as_mut()
            .unwrap()
            .submit_answers(answers);
        state.phase = state.resume_phase.take().unwrap();
        state.clear_stop();

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert!(state.limited_context_mode);
    }

    #[tokio::test]
    async fn test_truncated_synthesis_gets_exactly_one_continuation() {
        let gateway = ScriptedGateway::new().with_truncated_synthesis();
        let (deps, _sink) = deps_with(gateway);
        let mut state = new_state("truncated");

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        for result in &state.results {
            assert!(result.synthesis.ends_with("proceed with Option A."));
        }
    }

    #[tokio::test]
    async fn test_completed_sub_problem_is_not_redone() {
        let (deps, _sink) = deps_with(ScriptedGateway::new());
        let mut state = new_state("idempotent");
        run_to_end(&deps, &mut state).await.unwrap();
        assert_eq!(state.results.len(), 2);
        let cost_before = state.metrics.total_cost;

        // Replay the closing transition for the last sub-problem, as a crash
        // between persist and advance would.
        state.phase = ExecutionPhase::NextSubProblem;
        state.sub_problem_index = 1;
        state.current_synthesis = Some(state.results[1].synthesis.clone());
        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert_eq!(state.results.len(), 2);
        assert_eq!(state.metrics.total_cost, cost_before);
    }

    struct FailingGateway;

    #[async_trait::async_trait]
    impl ModelGateway for FailingGateway {
        async fn complete(&self, _request: ModelRequest) -> Result<ModelOutput, GatewayError> {
            Err(GatewayError::Provider("500 internal".to_string()))
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_marks_session_errored() {
        let sink = Arc::new(CollectingSink {
            events: Mutex::new(Vec::new()),
        });
        let deps = EngineDeps {
            gateway: Arc::new(FailingGateway),
            personas: Arc::new(TestPersonas),
            context: Arc::new(EmptyContext),
            embeddings: Arc::new(OrthogonalEmbedder::new()),
            research: Arc::new(NoResearch),
            state_store: Arc::new(TestStateStore::new()),
            checkpoints: Arc::new(TestCheckpointStore {
                records: Mutex::new(HashMap::new()),
            }),
            sink: sink.clone(),
        };
        let mut state = new_state("errored");

        let result = run_to_end(&deps, &mut state).await;

        assert!(matches!(result, Err(EngineError::Fatal(_))));
        assert_eq!(state.phase, ExecutionPhase::Errored);
        assert_eq!(
            state.stop_reason,
            Some(StopReason::Errored {
                kind: "fatal".to_string()
            })
        );
        assert!(sink.events.lock().unwrap().iter().any(|e| matches!(
            &e.kind,
            TransitionKind::Error { error_kind, .. } if error_kind == "fatal"
        )));
    }

    #[tokio::test]
    async fn test_external_kill_is_observed_at_phase_boundary() {
        let (deps, _sink) = deps_with(ScriptedGateway::new());
        let mut state = new_state("external-kill");
        deps.state_store.save(&state).await.unwrap();
        deps.state_store
            .update_status(&state.session_id, conclave_domain::SessionStatus::Killed)
            .await
            .unwrap();

        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );
        controller
            .run(&mut state, ProgressSender::disabled())
            .await
            .unwrap();

        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert_eq!(state.stop_reason, Some(StopReason::Killed));
        assert!(state.results.is_empty());
    }

    /// Issues an owner kill from inside the first model call, i.e. while a
    /// phase step is in flight.
    struct KillMidStepGateway {
        inner: ScriptedGateway,
        commands: crate::engine::control::SessionCommands,
        session: SessionId,
        fired: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ModelGateway for KillMidStepGateway {
        async fn complete(&self, request: ModelRequest) -> Result<ModelOutput, GatewayError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.commands
                    .kill(&self.session, "owner-1")
                    .await
                    .map_err(|e| GatewayError::Provider(e.to_string()))?;
            }
            self.inner.complete(request).await
        }
    }

    #[tokio::test]
    async fn test_kill_issued_mid_step_is_not_lost() {
        let store = Arc::new(TestStateStore::new());
        let mut state = new_state("mid-step-kill");
        store.save(&state).await.unwrap();

        let gateway = KillMidStepGateway {
            inner: ScriptedGateway::new(),
            commands: crate::engine::control::SessionCommands::new(store.clone()),
            session: state.session_id.clone(),
            fired: std::sync::atomic::AtomicBool::new(false),
        };
        let deps = EngineDeps {
            gateway: Arc::new(gateway),
            personas: Arc::new(TestPersonas),
            context: Arc::new(EmptyContext),
            embeddings: Arc::new(OrthogonalEmbedder::new()),
            research: Arc::new(NoResearch),
            state_store: store.clone(),
            checkpoints: Arc::new(TestCheckpointStore {
                records: Mutex::new(HashMap::new()),
            }),
            sink: Arc::new(CollectingSink {
                events: Mutex::new(Vec::new()),
            }),
        };
        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );

        controller
            .run(&mut state, ProgressSender::disabled())
            .await
            .unwrap();

        // The kill lands before the step's own persist can overwrite it.
        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert_eq!(state.stop_reason, Some(StopReason::Killed));
        assert!(state.results.is_empty());
        let metadata = store
            .load_metadata(&state.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.status, conclave_domain::SessionStatus::Killed);
    }

    #[tokio::test]
    async fn test_single_simple_sub_problem_uses_minimum_budget() {
        let (deps, _sink) = deps_with(ScriptedGateway::new().with_single_sub_problem());
        let mut state = new_state("simple");

        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.metrics.recommended_experts, 3);
        assert_eq!(state.metrics.recommended_rounds, 2);
        // The live panel is cleared on sub-problem close; the result
        // carries the panel that actually deliberated.
        assert_eq!(state.results[0].expert_panel.len(), 3);
        // Two rounds with the full panel, nothing deduplicated.
        assert_eq!(state.results[0].contribution_count, 6);
        assert_eq!(state.results[0].votes.len(), 3);
    }

    #[tokio::test]
    async fn test_partial_clarification_narrows_to_unanswered_questions() {
        let (deps, sink) = deps_with(ScriptedGateway::new().with_two_critical_gaps());
        let mut state = new_state("gap-narrow");

        run_to_end(&deps, &mut state).await.unwrap();
        assert_eq!(state.phase, ExecutionPhase::Clarifying);
        assert_eq!(
            state.pending_clarification.as_ref().unwrap().questions.len(),
            2
        );

        // Answer only the first question; the session re-suspends with the
        // question list narrowed to what is still open.
        let mut answers = std::collections::BTreeMap::new();
        answers.insert(
            "What is the budget?".to_string(),
            "Up to 2M EUR for the first year".to_string(),
        );
        state
            .pending_clarification
            .as_mut()
            .unwrap()
            .submit_answers(answers);
        state.phase = state.resume_phase.take().unwrap();
        state.clear_stop();
        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Clarifying);
        let pending = state.pending_clarification.as_ref().unwrap();
        assert_eq!(pending.questions.len(), 1);
        assert_eq!(pending.questions[0].question, "Which regions are in scope?");
        assert!(sink.events.lock().unwrap().iter().any(|e| matches!(
            e.kind,
            TransitionKind::ClarificationAnswered { remaining: 1 }
        )));

        // Answer the last question; the session runs through.
        let mut answers = std::collections::BTreeMap::new();
        answers.insert(
            "Which regions are in scope?".to_string(),
            "Germany and France only".to_string(),
        );
        state
            .pending_clarification
            .as_mut()
            .unwrap()
            .submit_answers(answers);
        state.phase = state.resume_phase.take().unwrap();
        state.clear_stop();
        run_to_end(&deps, &mut state).await.unwrap();

        assert_eq!(state.phase, ExecutionPhase::Complete);
        assert!(!state.limited_context_mode);
        assert!(state.problem.context.contains("Up to 2M EUR"));
        assert!(state.problem.context.contains("Germany and France"));
    }

    struct HangingGateway;

    #[async_trait::async_trait]
    impl ModelGateway for HangingGateway {
        async fn complete(&self, _request: ModelRequest) -> Result<ModelOutput, GatewayError> {
            std::future::pending().await
        }
    }

    fn hanging_deps() -> EngineDeps {
        EngineDeps {
            gateway: Arc::new(HangingGateway),
            personas: Arc::new(TestPersonas),
            context: Arc::new(EmptyContext),
            embeddings: Arc::new(OrthogonalEmbedder::new()),
            research: Arc::new(NoResearch),
            state_store: Arc::new(TestStateStore::new()),
            checkpoints: Arc::new(TestCheckpointStore {
                records: Mutex::new(HashMap::new()),
            }),
            sink: Arc::new(CollectingSink {
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_hard_ceiling_kills_hung_session() {
        let deps = hanging_deps();
        let mut state = new_state("hard-timeout");
        deps.state_store.save(&state).await.unwrap();
        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );
        let watchdog = crate::engine::watchdog::TimeoutWatchdog::new(
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(3600),
        );

        crate::engine::run_supervised(&controller, &mut state, &watchdog)
            .await
            .unwrap();

        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert_eq!(state.stop_reason, Some(StopReason::HardTimeout));
        // The terminal state is persisted.
        let raw = deps.state_store.load_raw(&state.session_id).await.unwrap();
        assert_eq!(raw.unwrap()["phase"], "Killed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_stall_kills_hung_session() {
        let deps = hanging_deps();
        let mut state = new_state("stall");
        deps.state_store.save(&state).await.unwrap();
        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );
        let watchdog = crate::engine::watchdog::TimeoutWatchdog::new(
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(5),
        );

        crate::engine::run_supervised(&controller, &mut state, &watchdog)
            .await
            .unwrap();

        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert_eq!(state.stop_reason, Some(StopReason::Stuck));
    }

    /// Answers every prompt normally but never returns a round summary,
    /// stranding the round between generation and summarization.
    struct HangOnSummaryGateway {
        inner: ScriptedGateway,
    }

    #[async_trait::async_trait]
    impl ModelGateway for HangOnSummaryGateway {
        async fn complete(&self, request: ModelRequest) -> Result<ModelOutput, GatewayError> {
            if request.prompt.starts_with("Summarize round") {
                std::future::pending().await
            } else {
                self.inner.complete(request).await
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_round_contributions_are_not_persisted() {
        let store = Arc::new(TestStateStore::new());
        let mut state = new_state("aborted-round");
        store.save(&state).await.unwrap();
        let deps = EngineDeps {
            gateway: Arc::new(HangOnSummaryGateway {
                inner: ScriptedGateway::new(),
            }),
            personas: Arc::new(TestPersonas),
            context: Arc::new(EmptyContext),
            embeddings: Arc::new(OrthogonalEmbedder::new()),
            research: Arc::new(NoResearch),
            state_store: store.clone(),
            checkpoints: Arc::new(TestCheckpointStore {
                records: Mutex::new(HashMap::new()),
            }),
            sink: Arc::new(CollectingSink {
                events: Mutex::new(Vec::new()),
            }),
        };
        let controller = PhaseController::new(
            deps.clone(),
            EngineConfig::default(),
            state.session_id.clone(),
        );
        let watchdog = crate::engine::watchdog::TimeoutWatchdog::new(
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(60),
        );

        crate::engine::run_supervised(&controller, &mut state, &watchdog)
            .await
            .unwrap();

        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert!(state.contributions.is_empty());
        let raw = store.load_raw(&state.session_id).await.unwrap().unwrap();
        assert_eq!(raw["contributions"].as_array().unwrap().len(), 0);
        assert_eq!(raw["phase"], "Killed");
    }
}
