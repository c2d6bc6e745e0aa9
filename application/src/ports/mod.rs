//! Port definitions
//!
//! Interfaces the engine consumes. Implementations (adapters) live in the
//! infrastructure layer.

pub mod context_store;
pub mod embedding;
pub mod event_sink;
pub mod model_gateway;
pub mod persona_store;
pub mod research_cache;
pub mod state_store;
