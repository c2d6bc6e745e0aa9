//! In-memory session state and checkpoint stores
//!
//! Default adapters for single-process deployments and for tests. The
//! session store honors the TTL contract of the port: every save refreshes
//! the deadline, and an expired entry reads back as absent.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use conclave_application::ports::state_store::{
    CheckpointStore, SessionMetadata, SessionStateStore, StoreError,
};
use conclave_domain::{ExecutionState, SessionId, SessionStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

struct Entry {
    raw: serde_json::Value,
    metadata: SessionMetadata,
    expires_at: DateTime<Utc>,
}

/// Session store backed by a process-local map with TTL bookkeeping.
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: ChronoDuration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(24)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("session store lock poisoned".to_string()))
    }

    fn fresh(entry: &Entry) -> bool {
        entry.expires_at > Utc::now()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn save(&self, state: &ExecutionState) -> Result<(), StoreError> {
        let raw = serde_json::to_value(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let metadata = SessionMetadata::from_state(state);
        let mut entries = self.lock()?;
        entries.insert(
            state.session_id.as_str().to_string(),
            Entry {
                raw,
                metadata,
                expires_at: Utc::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn load_raw(&self, id: &SessionId) -> Result<Option<serde_json::Value>, StoreError> {
        let entries = self.lock()?;
        Ok(entries
            .get(id.as_str())
            .filter(|e| Self::fresh(e))
            .map(|e| e.raw.clone()))
    }

    async fn load_metadata(&self, id: &SessionId) -> Result<Option<SessionMetadata>, StoreError> {
        let entries = self.lock()?;
        Ok(entries
            .get(id.as_str())
            .filter(|e| Self::fresh(e))
            .map(|e| e.metadata.clone()))
    }

    async fn update_status(&self, id: &SessionId, status: SessionStatus) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        let entry = entries
            .get_mut(id.as_str())
            .filter(|e| Self::fresh(e))
            .ok_or_else(|| StoreError::NotFound(id.short().to_string()))?;
        debug!("Session {}: status -> {:?}", id, status);
        entry.metadata.status = status;
        entry.metadata.last_activity = Utc::now();
        Ok(())
    }
}

/// Durable lagging checkpoint kept in a process-local map.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, usize>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn record(&self, id: &SessionId, last_completed_index: usize) -> Result<(), StoreError> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| StoreError::Unavailable("checkpoint store lock poisoned".to_string()))?;
        checkpoints.insert(id.as_str().to_string(), last_completed_index);
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<usize>, StoreError> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| StoreError::Unavailable("checkpoint store lock poisoned".to_string()))?;
        Ok(checkpoints.get(id.as_str()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::Problem;

    fn state(id: &str) -> ExecutionState {
        ExecutionState::new(
            SessionId::new(id.to_string()),
            "owner-1".to_string(),
            Problem::new("Title", "Description"),
        )
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let store = InMemorySessionStore::default();
        let s = state("session-roundtrip");
        store.save(&s).await.unwrap();

        let raw = store.load_raw(&s.session_id).await.unwrap();
        assert!(raw.is_some());
        let metadata = store.load_metadata(&s.session_id).await.unwrap().unwrap();
        assert_eq!(metadata.owner, "owner-1");
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = InMemorySessionStore::new(Duration::from_secs(0));
        let s = state("session-expired");
        store.save(&s).await.unwrap();

        assert!(store.load_raw(&s.session_id).await.unwrap().is_none());
        assert!(store.load_metadata(&s.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_only_touches_metadata() {
        let store = InMemorySessionStore::default();
        let s = state("session-status");
        store.save(&s).await.unwrap();

        store
            .update_status(&s.session_id, SessionStatus::Killed)
            .await
            .unwrap();
        let metadata = store.load_metadata(&s.session_id).await.unwrap().unwrap();
        assert_eq!(metadata.status, SessionStatus::Killed);

        // Raw state is untouched by the control surface.
        let raw = store.load_raw(&s.session_id).await.unwrap().unwrap();
        assert_eq!(raw["phase"], serde_json::json!("Decomposition"));
    }

    #[tokio::test]
    async fn test_update_status_unknown_session() {
        let store = InMemorySessionStore::default();
        let id = SessionId::new("missing".to_string());
        let err = store.update_status(&id, SessionStatus::Paused).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_checkpoint_record_and_load() {
        let store = InMemoryCheckpointStore::new();
        let id = SessionId::new("session-ckpt".to_string());
        assert_eq!(store.load(&id).await.unwrap(), None);
        store.record(&id, 0).await.unwrap();
        store.record(&id, 2).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(2));
    }
}
