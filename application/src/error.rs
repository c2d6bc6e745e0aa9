//! Engine error taxonomy
//!
//! Five classes with distinct recovery policies: transient provider failures
//! retry with backoff then turn fatal; validation failures recover locally
//! with one re-prompt; state corruption is repaired and logged; permission
//! failures surface without mutation; everything else halts the session.

use crate::ports::event_sink::SinkError;
use crate::ports::model_gateway::GatewayError;
use crate::ports::state_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Short tag recorded on the Errored session and its error event.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            EngineError::Transient(_) => "transient",
            EngineError::Validation(_) => "validation",
            EngineError::StateCorruption(_) => "state_corruption",
            EngineError::Permission(_) => "permission",
            EngineError::Fatal(_) => "fatal",
        }
    }

    /// Sanitized message for end users. Operators get the full error via
    /// logs; users never see provider internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::Transient(_) => "The model provider was unavailable. Please retry.",
            EngineError::Validation(_) => "A model response could not be used.",
            EngineError::StateCorruption(_) => "Saved session data was invalid and repaired.",
            EngineError::Permission(_) => "You do not have permission for this action.",
            EngineError::Fatal(_) => "The session hit an unrecoverable error.",
        }
    }
}

impl From<GatewayError> for EngineError {
    fn from(e: GatewayError) -> Self {
        if e.is_transient() {
            EngineError::Transient(e.to_string())
        } else if matches!(e, GatewayError::Validation(_)) {
            EngineError::Validation(e.to_string())
        } else {
            EngineError::Fatal(e.to_string())
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Fatal(format!("store: {}", e))
    }
}

impl From<SinkError> for EngineError {
    fn from(e: SinkError) -> Self {
        EngineError::Fatal(format!("event sink: {}", e))
    }
}
