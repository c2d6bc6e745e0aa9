//! HTTP model gateway for OpenAI-compatible chat completion endpoints
//!
//! Maps the wire-level failure modes onto the port's transient/permanent
//! split: connect and timeout errors are transient, HTTP 429/5xx are
//! transient provider errors, 4xx and undecodable bodies are permanent.

use async_trait::async_trait;
use conclave_application::ports::model_gateway::{
    GatewayError, ModelGateway, ModelOutput, ModelRequest,
};
use conclave_domain::CallUsage;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Cost per 1000 tokens, used to price usage reports.
    pub cost_per_1k_tokens: f64,
}

pub struct HttpModelGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    total_tokens: u64,
}

impl HttpModelGateway {
    pub fn new(config: HttpGatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn classify(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_connect() || e.is_request() {
            GatewayError::Connection(e.to_string())
        } else {
            GatewayError::Provider(e.to_string())
        }
    }
}

#[async_trait]
impl ModelGateway for HttpModelGateway {
    async fn complete(&self, request: ModelRequest) -> Result<ModelOutput, GatewayError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = WireRequest {
            model: &self.config.model,
            messages,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Rate limits and server faults are worth a retry.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(GatewayError::Connection(format!("HTTP {status}: {text}")))
            } else {
                Err(GatewayError::Provider(format!("HTTP {status}: {text}")))
            };
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Validation("response had no choices".to_string()))?;

        let tokens = wire.usage.map(|u| u.total_tokens).unwrap_or(0);
        let usage = CallUsage::new(tokens, tokens as f64 / 1000.0 * self.config.cost_per_1k_tokens);
        let truncated = choice.finish_reason.as_deref() == Some("length");
        debug!(
            "Completion: {} tokens, truncated={}",
            tokens, truncated
        );

        Ok(ModelOutput {
            content: choice.message.content,
            usage,
            truncated,
        })
    }
}
