//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Values convert into the engine's runtime config via [`FileEngineConfig::to_engine_config`].
//!
//! Example configuration:
//!
//! ```toml
//! [engine]
//! max_sub_problems = 4
//! enforcement = "hard"
//! hard_ceiling_secs = 1800
//!
//! [provider]
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o"
//! api_key_env = "CONCLAVE_API_KEY"
//!
//! [log]
//! events_path = "conclave-events.jsonl"
//! ```

use conclave_application::config::{EngineConfig, EnforcementMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Engine limits and policies
    pub engine: FileEngineConfig,
    /// Model provider endpoint
    pub provider: FileProviderConfig,
    /// Event log settings
    pub log: FileLogConfig,
}

/// `[engine]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEngineConfig {
    /// Cap on sub-problems after decomposition
    pub max_sub_problems: usize,
    /// Fixed panel size; overrides the complexity-derived value
    pub expert_override: Option<usize>,
    /// Cosine similarity above which contributions are near-duplicates
    pub dedup_threshold: f32,
    /// Depth score below which a contribution is flagged shallow
    pub shallow_threshold: f64,
    /// Challenge markers required in a challenge-phase contribution
    pub challenge_min_markers: usize,
    /// "soft" logs challenge violations, "hard" retries them once
    pub enforcement: String,
    /// Referenced artifacts injected per category
    pub artifact_cap: usize,
    /// Per model call timeout, seconds
    pub call_timeout_secs: u64,
    /// Hard wall-clock ceiling per session, seconds
    pub hard_ceiling_secs: u64,
    /// Liveness window for stuck detection, seconds
    pub liveness_window_secs: u64,
}

impl Default for FileEngineConfig {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_sub_problems: defaults.max_sub_problems,
            expert_override: None,
            dedup_threshold: defaults.dedup_threshold,
            shallow_threshold: defaults.shallow_threshold,
            challenge_min_markers: defaults.challenge_min_markers,
            enforcement: "soft".to_string(),
            artifact_cap: defaults.artifact_cap,
            call_timeout_secs: defaults.call_timeout.as_secs(),
            hard_ceiling_secs: defaults.hard_ceiling.as_secs(),
            liveness_window_secs: defaults.liveness_window.as_secs(),
        }
    }
}

impl FileEngineConfig {
    pub fn parse_enforcement(&self) -> EnforcementMode {
        match self.enforcement.as_str() {
            "hard" => EnforcementMode::Hard,
            _ => EnforcementMode::Soft,
        }
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_sub_problems: self.max_sub_problems,
            expert_override: self.expert_override,
            dedup_threshold: self.dedup_threshold,
            shallow_threshold: self.shallow_threshold,
            challenge_min_markers: self.challenge_min_markers,
            enforcement: self.parse_enforcement(),
            artifact_cap: self.artifact_cap,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            hard_ceiling: Duration::from_secs(self.hard_ceiling_secs),
            liveness_window: Duration::from_secs(self.liveness_window_secs),
            ..EngineConfig::default()
        }
    }
}

/// `[provider]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    /// Chat completions endpoint URL
    pub endpoint: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Cost per 1000 tokens for usage pricing
    pub cost_per_1k_tokens: f64,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "CONCLAVE_API_KEY".to_string(),
            cost_per_1k_tokens: 0.01,
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Transition event log path; empty disables the JSONL sink
    pub events_path: String,
    /// Root directory for saved context and artifacts
    pub context_root: String,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            events_path: "conclave-events.jsonl".to_string(),
            context_root: ".conclave/context".to_string(),
        }
    }
}
