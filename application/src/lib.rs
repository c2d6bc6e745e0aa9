//! Application layer for conclave
//!
//! This crate contains the deliberation engine, port definitions, and
//! execution policies. It depends only on the domain layer; adapters live in
//! the infrastructure layer.

pub mod config;
pub mod engine;
pub mod error;
pub mod ports;
pub mod retry;

// Re-export commonly used types
pub use config::{EngineConfig, EnforcementMode};
pub use engine::checkpoint::CheckpointGuard;
pub use engine::control::SessionCommands;
pub use engine::controller::{EngineDeps, PhaseController};
pub use engine::emitter::SessionEventEmitter;
pub use engine::generator::{ContributionGenerator, GenerationReport};
pub use engine::quality::{QualityGate, QualityOutcome};
pub use engine::run_supervised;
pub use engine::watchdog::{ProgressEvent, TimeoutWatchdog, WatchdogHandle, WatchdogVerdict};
pub use error::EngineError;
pub use ports::{
    context_store::{Artifact, ArtifactKind, ContextStore, SavedContext},
    embedding::{EmbeddingError, EmbeddingService},
    event_sink::{EventSink, SinkError},
    model_gateway::{GatewayError, ModelGateway, ModelOutput, ModelRequest},
    persona_store::PersonaStore,
    research_cache::{ResearchCache, ResearchFinding},
    state_store::{CheckpointStore, SessionMetadata, SessionStateStore, StoreError},
};
pub use retry::RetryPolicy;
