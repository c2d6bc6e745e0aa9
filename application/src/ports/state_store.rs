//! Session persistence ports
//!
//! The fast store holds the full execution state and metadata under a
//! session-scoped key with a TTL refreshed on every write. State is returned
//! raw (JSON) so the checkpoint guard can repair structural corruption before
//! the single typed decode at the store boundary. A secondary durable store
//! holds a lagging checkpoint sufficient to resume after total loss of the
//! fast store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conclave_domain::{ExecutionState, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Metadata carried alongside the state, readable without decoding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub owner: String,
    pub status: SessionStatus,
    pub cost: f64,
    /// Feeds the watchdog's notion of recency.
    pub last_activity: DateTime<Utc>,
}

impl SessionMetadata {
    pub fn from_state(state: &ExecutionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            owner: state.owner.clone(),
            status: state.status(),
            cost: state.metrics.total_cost,
            last_activity: Utc::now(),
        }
    }
}

/// Fast session-scoped store with per-write TTL refresh.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Persist state and metadata as one unit; refreshes the TTL.
    async fn save(&self, state: &ExecutionState) -> Result<(), StoreError>;

    /// Raw persisted state, if present. Decoded exactly once, at the store
    /// boundary, by the checkpoint guard.
    async fn load_raw(&self, id: &SessionId) -> Result<Option<serde_json::Value>, StoreError>;

    async fn load_metadata(&self, id: &SessionId) -> Result<Option<SessionMetadata>, StoreError>;

    /// Mutate only the status field (control surface commands).
    async fn update_status(&self, id: &SessionId, status: SessionStatus) -> Result<(), StoreError>;
}

/// Durable lagging checkpoint: last completed sub-problem index.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn record(&self, id: &SessionId, last_completed_index: usize) -> Result<(), StoreError>;

    async fn load(&self, id: &SessionId) -> Result<Option<usize>, StoreError>;
}
