//! Session control surface
//!
//! Pause and Kill write only the store-side status flag; the running
//! controller observes it at its next phase boundary and folds it into the
//! full state, which it alone writes. Resume and SubmitClarification act on
//! suspended sessions, where no controller holds the state.

use crate::engine::checkpoint::CheckpointGuard;
use crate::error::EngineError;
use crate::ports::state_store::SessionStateStore;
use conclave_domain::{ExecutionPhase, ExecutionState, SessionId, SessionStatus, StopReason};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct SessionCommands {
    store: Arc<dyn SessionStateStore>,
}

impl SessionCommands {
    pub fn new(store: Arc<dyn SessionStateStore>) -> Self {
        Self { store }
    }

    /// Restore the stored state, folding in the metadata status flag. A stop
    /// issued while a run was in flight lands in metadata first; the raw
    /// state catches up at the controller's next phase boundary.
    async fn load(&self, id: &SessionId) -> Result<ExecutionState, EngineError> {
        let raw = self
            .store
            .load_raw(id)
            .await?
            .ok_or_else(|| EngineError::Fatal(format!("session {} not found", id)))?;
        let mut state = CheckpointGuard::restore(raw, id)?;
        if let Some(metadata) = self.store.load_metadata(id).await? {
            match metadata.status {
                SessionStatus::Killed if state.phase != ExecutionPhase::Killed => {
                    state.phase = ExecutionPhase::Killed;
                    state.mark_stopped(StopReason::Killed);
                }
                SessionStatus::Paused if !state.phase.is_suspended() => {
                    state.resume_phase = Some(state.phase);
                    state.phase = ExecutionPhase::Paused;
                    state.mark_stopped(StopReason::Paused);
                }
                _ => {}
            }
        }
        Ok(state)
    }

    /// Suspend at the next phase boundary. Metadata-only: a concurrently
    /// running controller keeps sole write access to the full state and
    /// folds the flag in itself.
    pub async fn pause(&self, id: &SessionId) -> Result<(), EngineError> {
        let state = self.load(id).await?;
        if state.phase.is_terminal() {
            return Err(EngineError::Validation(format!(
                "session {} already {}",
                id, state.phase
            )));
        }
        self.store.update_status(id, SessionStatus::Paused).await?;
        info!("Session {} paused", id);
        Ok(())
    }

    /// Clear the stop flag and restore the pre-suspension phase. The
    /// returned state is what the controller should re-enter with; the
    /// checkpoint guard prevents any completed work from being redone.
    pub async fn resume(&self, id: &SessionId) -> Result<ExecutionState, EngineError> {
        let mut state = self.load(id).await?;
        if state.phase.is_terminal() {
            return Err(EngineError::Validation(format!(
                "session {} already {}",
                id, state.phase
            )));
        }
        if state.phase.is_suspended() {
            state.phase = state.resume_phase.take().unwrap_or(ExecutionPhase::GapCheck);
        }
        state.clear_stop();
        self.store.save(&state).await?;
        info!("Session {} resumed at {}", id, state.phase);
        Ok(state)
    }

    /// Terminate the session. Requires ownership; killing a session that
    /// already reached a terminal phase succeeds trivially.
    pub async fn kill(&self, id: &SessionId, requester: &str) -> Result<(), EngineError> {
        let state = self.load(id).await?;
        if state.owner != requester {
            return Err(EngineError::Permission(format!(
                "user {} does not own session {}",
                requester, id
            )));
        }
        if state.phase.is_terminal() {
            return Ok(());
        }
        self.store.update_status(id, SessionStatus::Killed).await?;
        info!("Session {} killed by owner", id);
        Ok(())
    }

    /// Record clarification answers, keyed by question text. The session
    /// stays suspended; re-running the controller lets GapCheck recompute
    /// the unanswered set.
    pub async fn submit_clarification(
        &self,
        id: &SessionId,
        requester: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        let mut state = self.load(id).await?;
        if state.owner != requester {
            return Err(EngineError::Permission(format!(
                "user {} does not own session {}",
                requester, id
            )));
        }
        let Some(pending) = state.pending_clarification.as_mut() else {
            return Err(EngineError::Validation(format!(
                "session {} is not waiting for clarification",
                id
            )));
        };
        pending.submit_answers(answers);
        self.store.save(&state).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::state_store::{SessionMetadata, StoreError};
    use conclave_domain::{
        ClarificationQuestion, GapPriority, PendingClarification, Problem, SessionStatus,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore {
        entries: Mutex<HashMap<String, (serde_json::Value, SessionMetadata)>>,
    }

    impl MapStore {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionStateStore for MapStore {
        async fn save(&self, state: &ExecutionState) -> Result<(), StoreError> {
            let raw = serde_json::to_value(state)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.entries.lock().unwrap().insert(
                state.session_id.as_str().to_string(),
                (raw, SessionMetadata::from_state(state)),
            );
            Ok(())
        }

        async fn load_raw(&self, id: &SessionId) -> Result<Option<serde_json::Value>, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(id.as_str())
                .map(|(raw, _)| raw.clone()))
        }

        async fn load_metadata(
            &self,
            id: &SessionId,
        ) -> Result<Option<SessionMetadata>, StoreError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(id.as_str())
                .map(|(_, m)| m.clone()))
        }

        async fn update_status(
            &self,
            id: &SessionId,
            status: SessionStatus,
        ) -> Result<(), StoreError> {
            let mut entries = self.entries.lock().unwrap();
            let (_, metadata) = entries
                .get_mut(id.as_str())
                .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;
            metadata.status = status;
            Ok(())
        }
    }

    async fn seeded(phase: ExecutionPhase) -> (SessionCommands, SessionId) {
        let store = Arc::new(MapStore::new());
        let id = SessionId::new("session-ctl");
        let mut state = ExecutionState::new(
            id.clone(),
            "owner-1".to_string(),
            Problem::new("T", "D"),
        );
        state.phase = phase;
        store.save(&state).await.unwrap();
        (SessionCommands::new(store), id)
    }

    #[tokio::test]
    async fn test_pause_then_resume_restores_phase() {
        let (commands, id) = seeded(ExecutionPhase::Voting).await;

        commands.pause(&id).await.unwrap();
        let paused = commands.load(&id).await.unwrap();
        assert_eq!(paused.phase, ExecutionPhase::Paused);
        assert_eq!(paused.stop_reason, Some(StopReason::Paused));

        let resumed = commands.resume(&id).await.unwrap();
        assert_eq!(resumed.phase, ExecutionPhase::Voting);
        assert!(resumed.stop_reason.is_none());
    }

    #[tokio::test]
    async fn test_kill_requires_ownership_and_mutates_nothing() {
        let (commands, id) = seeded(ExecutionPhase::Voting).await;

        let err = commands.kill(&id, "intruder").await;
        assert!(matches!(err, Err(EngineError::Permission(_))));
        let state = commands.load(&id).await.unwrap();
        assert_eq!(state.phase, ExecutionPhase::Voting);
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let (commands, id) = seeded(ExecutionPhase::Voting).await;

        commands.kill(&id, "owner-1").await.unwrap();
        commands.kill(&id, "owner-1").await.unwrap();
        let state = commands.load(&id).await.unwrap();
        assert_eq!(state.phase, ExecutionPhase::Killed);
        assert_eq!(state.stop_reason, Some(StopReason::Killed));
    }

    #[tokio::test]
    async fn test_pause_terminal_session_is_rejected() {
        let (commands, id) = seeded(ExecutionPhase::Complete).await;
        assert!(matches!(
            commands.pause(&id).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_clarification_records_answers() {
        let store = Arc::new(MapStore::new());
        let id = SessionId::new("session-clarify");
        let mut state = ExecutionState::new(
            id.clone(),
            "owner-1".to_string(),
            Problem::new("T", "D"),
        );
        state.phase = ExecutionPhase::Clarifying;
        state.pending_clarification = Some(PendingClarification::new(vec![
            ClarificationQuestion::new("Budget?", "sizing", GapPriority::Critical),
        ]));
        store.save(&state).await.unwrap();
        let commands = SessionCommands::new(store);

        let mut answers = BTreeMap::new();
        answers.insert("Budget?".to_string(), "2M EUR".to_string());
        commands
            .submit_clarification(&id, "owner-1", answers)
            .await
            .unwrap();

        let loaded = commands.load(&id).await.unwrap();
        let pending = loaded.pending_clarification.unwrap();
        assert!(pending.is_resolved());
    }

    #[tokio::test]
    async fn test_submit_clarification_without_pending_is_rejected() {
        let (commands, id) = seeded(ExecutionPhase::Voting).await;
        let err = commands
            .submit_clarification(&id, "owner-1", BTreeMap::new())
            .await;
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }
}
