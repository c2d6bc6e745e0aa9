//! Contribution generator
//!
//! Fans out one concurrent model call per selected expert, structurally
//! validates the outputs, and runs at most one retry wave for malformed
//! contributions (accepted either way). Challenge rounds additionally check
//! a minimum critical-engagement marker count under the configured
//! enforcement mode.

use crate::config::{EngineConfig, EnforcementMode};
use crate::engine::prompts;
use crate::error::EngineError;
use crate::ports::model_gateway::{GatewayError, ModelGateway, ModelOutput, ModelRequest};
use crate::retry::RetryPolicy;
use conclave_domain::{
    CallUsage, Contribution, ContributionKind, PersonaProfile, RoundPhase, RoundSummary, parsing,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Everything one round's generation pass needs to know.
#[derive(Debug, Clone, Default)]
pub struct RoundContext {
    pub round: usize,
    pub phase: RoundPhase,
    pub goal: String,
    pub context: String,
    /// Syntheses of sub-problems this one depends on.
    pub dependency_context: String,
    pub summaries: Vec<RoundSummary>,
    pub guidance: Vec<String>,
    /// Per-expert memory, keyed by persona code.
    pub memories: BTreeMap<String, String>,
    pub research: Vec<String>,
}

/// Outcome of one generation pass, with degradation counters.
#[derive(Debug)]
pub struct GenerationReport {
    pub contributions: Vec<Contribution>,
    /// Malformed contributions that got the one structural retry.
    pub structural_retries: usize,
    /// Contributions accepted despite a failed retry.
    pub degraded: usize,
    /// Challenge-round contributions below the marker threshold.
    pub challenge_rejections: usize,
    /// Challenge retries issued (hard enforcement only).
    pub challenge_retries: usize,
    pub usage: CallUsage,
}

pub struct ContributionGenerator {
    gateway: Arc<dyn ModelGateway>,
    retry: RetryPolicy,
    call_timeout: Duration,
    enforcement: EnforcementMode,
    challenge_min_markers: usize,
}

impl ContributionGenerator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &EngineConfig) -> Self {
        Self {
            gateway,
            retry: config.retry.clone(),
            call_timeout: config.call_timeout,
            enforcement: config.enforcement,
            challenge_min_markers: config.challenge_min_markers,
        }
    }

    /// Generate one round of contributions for the given panel.
    pub async fn generate(
        &self,
        panel: &[PersonaProfile],
        ctx: &RoundContext,
    ) -> Result<GenerationReport, EngineError> {
        let mut report = GenerationReport {
            contributions: Vec::new(),
            structural_retries: 0,
            degraded: 0,
            challenge_rejections: 0,
            challenge_retries: 0,
            usage: CallUsage::default(),
        };

        let kind = if ctx.round <= 1 {
            ContributionKind::Initial
        } else {
            ContributionKind::Response
        };

        // Wave 1: one concurrent call per expert
        let mut join_set = JoinSet::new();
        for persona in panel {
            let request = ModelRequest::new(self.expert_prompt(persona, ctx))
                .with_system(prompts::persona_system(persona));
            self.spawn_call(&mut join_set, persona.clone(), request);
        }

        let mut malformed: Vec<(PersonaProfile, ModelOutput)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (persona, result) =
                joined.map_err(|e| EngineError::Fatal(format!("task join: {}", e)))?;
            let output = result?;
            report.usage.add(output.usage);
            match parsing::extract_answer(&output.content) {
                Some(_) => {
                    debug!("Round {}: {} contributed", ctx.round, persona.code);
                    report.contributions.push(self.to_contribution(&persona, &output, kind, ctx.round));
                }
                None => malformed.push((persona, output)),
            }
        }

        // Wave 2: exactly one structural retry per malformed contribution,
        // with simplified instructions; accepted regardless of the outcome.
        if !malformed.is_empty() {
            report.structural_retries = malformed.len();
            let mut retry_set = JoinSet::new();
            for (persona, _) in &malformed {
                let request = ModelRequest::new(prompts::simplified_retry(&ctx.goal, ctx.phase))
                    .with_system(prompts::persona_system(persona));
                self.spawn_call(&mut retry_set, persona.clone(), request);
            }
            while let Some(joined) = retry_set.join_next().await {
                let (persona, result) =
                    joined.map_err(|e| EngineError::Fatal(format!("task join: {}", e)))?;
                let output = result?;
                report.usage.add(output.usage);
                if parsing::extract_answer(&output.content).is_none() {
                    report.degraded += 1;
                    warn!(
                        "Round {}: {} still malformed after retry, accepting degraded",
                        ctx.round, persona.code
                    );
                }
                report.contributions.push(self.to_contribution(&persona, &output, kind, ctx.round));
            }
        }

        if ctx.phase.is_challenge() {
            self.enforce_challenge(panel, ctx, &mut report).await?;
        }

        // Join order is nondeterministic; restore the caller's panel order
        // so transcripts and summary prompts read the same on every run.
        let position: BTreeMap<&str, usize> = panel
            .iter()
            .enumerate()
            .map(|(i, p)| (p.code.as_str(), i))
            .collect();
        report.contributions.sort_by_key(|c| {
            position
                .get(c.persona_code.as_str())
                .copied()
                .unwrap_or(usize::MAX)
        });

        info!(
            "Round {} generated {} contributions ({} retried, {} degraded)",
            ctx.round,
            report.contributions.len(),
            report.structural_retries,
            report.degraded
        );
        Ok(report)
    }

    /// Challenge-round critical-engagement enforcement.
    ///
    /// Soft mode logs and keeps everything. Hard mode issues one retry per
    /// failing contribution and accepts the retry's output regardless.
    async fn enforce_challenge(
        &self,
        panel: &[PersonaProfile],
        ctx: &RoundContext,
        report: &mut GenerationReport,
    ) -> Result<(), EngineError> {
        let failing: Vec<usize> = report
            .contributions
            .iter()
            .enumerate()
            .filter(|(_, c)| parsing::count_challenge_markers(&c.content) < self.challenge_min_markers)
            .map(|(i, _)| i)
            .collect();

        report.challenge_rejections = failing.len();
        if failing.is_empty() {
            return Ok(());
        }

        match self.enforcement {
            EnforcementMode::Soft => {
                for &i in &failing {
                    warn!(
                        "Round {}: contribution from {} lacks critical engagement (soft mode, kept)",
                        ctx.round, report.contributions[i].persona_code
                    );
                }
            }
            EnforcementMode::Hard => {
                for &i in &failing {
                    let code = report.contributions[i].persona_code.clone();
                    let Some(persona) = panel.iter().find(|p| p.code == code) else {
                        continue;
                    };
                    report.challenge_retries += 1;
                    let request = ModelRequest::new(prompts::challenge_retry(
                        &ctx.goal,
                        &report.contributions[i].content,
                    ))
                    .with_system(prompts::persona_system(persona));
                    let output = self.call(request).await?;
                    report.usage.add(output.usage);
                    if parsing::count_challenge_markers(&output.content) < self.challenge_min_markers {
                        report.degraded += 1;
                        warn!(
                            "Round {}: {} still below challenge threshold, accepting degraded",
                            ctx.round, code
                        );
                    }
                    let kind = report.contributions[i].kind;
                    report.contributions[i] =
                        self.to_contribution(persona, &output, kind, ctx.round);
                }
            }
        }
        Ok(())
    }

    fn expert_prompt(&self, persona: &PersonaProfile, ctx: &RoundContext) -> String {
        prompts::contribution(&prompts::ContributionPromptInput {
            goal: &ctx.goal,
            context: &ctx.context,
            round: ctx.round,
            phase: ctx.phase,
            summaries: &ctx.summaries,
            guidance: &ctx.guidance,
            memory: ctx.memories.get(&persona.code).map(String::as_str),
            dependency_context: &ctx.dependency_context,
            research: &ctx.research,
        })
    }

    fn to_contribution(
        &self,
        persona: &PersonaProfile,
        output: &ModelOutput,
        kind: ContributionKind,
        round: usize,
    ) -> Contribution {
        Contribution::new(&persona.code, &persona.name, &output.content, kind, round)
            .with_usage(output.usage)
    }

    fn spawn_call(
        &self,
        join_set: &mut JoinSet<(PersonaProfile, Result<ModelOutput, EngineError>)>,
        persona: PersonaProfile,
        request: ModelRequest,
    ) {
        let gateway = Arc::clone(&self.gateway);
        let retry = self.retry.clone();
        let timeout = self.call_timeout;
        join_set.spawn(async move {
            let result = call_with_policy(&gateway, &retry, timeout, request).await;
            (persona, result)
        });
    }

    async fn call(&self, request: ModelRequest) -> Result<ModelOutput, EngineError> {
        call_with_policy(&self.gateway, &self.retry, self.call_timeout, request).await
    }
}

/// One model call under the per-call timeout and the transient retry policy.
pub async fn call_with_policy(
    gateway: &Arc<dyn ModelGateway>,
    retry: &RetryPolicy,
    call_timeout: Duration,
    request: ModelRequest,
) -> Result<ModelOutput, EngineError> {
    retry
        .run(
            || async {
                match tokio::time::timeout(call_timeout, gateway.complete(request.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout),
                }
            },
            GatewayError::is_transient,
        )
        .await
        .map_err(EngineError::from)
}
