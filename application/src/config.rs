//! Engine configuration
//!
//! One explicitly constructed configuration object per session run; no
//! module-level mutable defaults. The infrastructure layer builds this from
//! its file config.

use crate::retry::RetryPolicy;
use conclave_domain::complexity::ComplexityProfile;
use std::time::Duration;

/// How Challenge-round critical-engagement failures are treated.
///
/// A single configuration-time policy value, never call-path conditionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    /// Log-only; failing contributions are always kept.
    Soft,
    /// One retry per failing contribution, accepted regardless of the
    /// retry's outcome, with rejection/retry counters recorded.
    Hard,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Decomposition hard cap; over-decomposition reduces output quality.
    pub max_sub_problems: usize,
    pub complexity: ComplexityProfile,
    /// Experiment override: fixes the expert count, bypassing the
    /// complexity-derived value.
    pub expert_override: Option<usize>,
    /// Cosine similarity at or above which contributions are duplicates.
    pub dedup_threshold: f32,
    /// Combined depth score below which a contribution is shallow.
    pub shallow_threshold: f64,
    /// Minimum critical-engagement markers for Challenge rounds.
    pub challenge_min_markers: usize,
    pub enforcement: EnforcementMode,
    /// Referenced artifacts kept per category during context collection.
    pub artifact_cap: usize,
    pub research_lookup_limit: usize,
    pub research_ttl: Duration,
    pub retry: RetryPolicy,
    /// Per-call timeout, independent of the watchdog timers.
    pub call_timeout: Duration,
    /// Absolute wall-clock cap per session.
    pub hard_ceiling: Duration,
    /// Stall window; reset only by meaningful progress.
    pub liveness_window: Duration,
    /// Token budget for the single synthesis continuation call.
    pub continuation_max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sub_problems: 4,
            complexity: ComplexityProfile::default(),
            expert_override: None,
            dedup_threshold: 0.92,
            shallow_threshold: 0.35,
            challenge_min_markers: 2,
            enforcement: EnforcementMode::Soft,
            artifact_cap: 3,
            research_lookup_limit: 3,
            research_ttl: Duration::from_secs(7 * 24 * 3600),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(120),
            hard_ceiling: Duration::from_secs(30 * 60),
            liveness_window: Duration::from_secs(10 * 60),
            continuation_max_tokens: 2048,
        }
    }
}
