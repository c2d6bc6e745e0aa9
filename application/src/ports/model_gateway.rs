//! Model provider gateway port
//!
//! One prompt in, content plus usage out. The transport (HTTP, local CLI,
//! streaming) is the adapter's concern; the engine only sees this contract
//! and the transient/validation error split that drives its retry policy.

use async_trait::async_trait;
use conclave_domain::CallUsage;
use thiserror::Error;

/// Errors a model call can raise.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Malformed response: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Connection(_))
    }
}

/// One completion request.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One completion response.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub content: String,
    pub usage: CallUsage,
    /// Set when the provider reports a length-style stop.
    pub truncated: bool,
}

impl ModelOutput {
    pub fn new(content: impl Into<String>, usage: CallUsage) -> Self {
        Self {
            content: content.into(),
            usage,
            truncated: false,
        }
    }
}

/// Gateway for model completions.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelOutput, GatewayError>;
}
