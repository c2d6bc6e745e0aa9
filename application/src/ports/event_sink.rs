//! Event sink port
//!
//! Receives the ordered transition-event stream. The sink is the transport
//! boundary; sequencing, replay and at-least-once delivery are the
//! emitter's job.

use async_trait::async_trait;
use conclave_domain::TransitionEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError>;
}

/// Sink that drops everything; for tests and headless runs.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: &TransitionEvent) -> Result<(), SinkError> {
        Ok(())
    }
}
