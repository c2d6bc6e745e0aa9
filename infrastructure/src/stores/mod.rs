//! State, checkpoint and research cache adapters

mod memory;
mod research;

pub use memory::{InMemoryCheckpointStore, InMemorySessionStore};
pub use research::InMemoryResearchCache;
