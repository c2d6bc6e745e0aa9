//! Transition event emitter
//!
//! Owns the per-session sequencing contract: every event gets the next
//! monotonically increasing sequence number, is buffered for replay, then
//! published to the sink at-least-once. A failed publish keeps the event in
//! the buffer, so a consumer can request replay from any prior sequence
//! number after a connection gap.

use crate::ports::event_sink::EventSink;
use conclave_domain::{SessionId, TransitionEvent, TransitionKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

pub struct SessionEventEmitter {
    session_id: SessionId,
    sink: Arc<dyn EventSink>,
    next_sequence: AtomicU64,
    replay_buffer: Mutex<Vec<TransitionEvent>>,
}

impl SessionEventEmitter {
    pub fn new(session_id: SessionId, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session_id,
            sink,
            next_sequence: AtomicU64::new(1),
            replay_buffer: Mutex::new(Vec::new()),
        }
    }

    /// Assign the next sequence number, buffer, publish. Publish failures
    /// are logged, never fatal: the event stays replayable.
    pub async fn emit(&self, kind: TransitionKind) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = TransitionEvent::new(self.session_id.clone(), sequence, kind);

        self.replay_buffer.lock().await.push(event.clone());

        if let Err(e) = self.sink.publish(&event).await {
            warn!(
                "Session {}: event {} publish failed, kept for replay: {}",
                self.session_id, sequence, e
            );
        }
    }

    /// All buffered events with sequence >= `from`, in order.
    pub async fn replay_from(&self, from: u64) -> Vec<TransitionEvent> {
        self.replay_buffer
            .lock()
            .await
            .iter()
            .filter(|e| e.sequence >= from)
            .cloned()
            .collect()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}
