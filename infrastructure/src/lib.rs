//! Infrastructure layer for conclave
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod context;
pub mod embedding;
pub mod gateway;
pub mod logging;
pub mod personas;
pub mod stores;

// Re-export commonly used types
pub use config::{ConfigLoader, FileConfig, FileEngineConfig, FileProviderConfig};
pub use context::FileContextStore;
pub use embedding::HashEmbedder;
pub use gateway::HttpModelGateway;
pub use logging::JsonlEventSink;
pub use personas::StaticPersonaCatalog;
pub use stores::{InMemoryCheckpointStore, InMemoryResearchCache, InMemorySessionStore};
