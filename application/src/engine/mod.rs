//! The deliberation engine
//!
//! [`controller`] holds the phase state machine; the other modules are the
//! policies it composes: contribution generation, quality gating, checkpoint
//! guards, event emission, and timeout supervision.

pub mod checkpoint;
pub mod control;
pub mod controller;
pub mod emitter;
pub mod generator;
pub mod prompts;
pub mod quality;
pub mod watchdog;

use crate::engine::controller::PhaseController;
use crate::engine::watchdog::{TimeoutWatchdog, WatchdogVerdict};
use crate::error::EngineError;
use conclave_domain::{ExecutionPhase, ExecutionState, StopReason};
use tracing::info;

/// Run a session under watchdog supervision.
///
/// The watchdog only observes; termination is applied here. When a timer
/// trips, the run future is dropped at its next await point, the session is
/// marked Killed with the verdict's stop reason, and the final state is
/// persisted.
pub async fn run_supervised(
    controller: &PhaseController,
    state: &mut ExecutionState,
    watchdog: &TimeoutWatchdog,
) -> Result<(), EngineError> {
    let handle = watchdog.spawn(state.session_id.clone());
    let progress = handle.progress();
    let tripped = handle.tripped();

    // The run future borrows state mutably; the inner scope drops it before
    // the trip path touches state again.
    let outcome = {
        let run = controller.run(state, progress);
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => Some(result),
            _ = tripped.cancelled() => None,
        }
    };

    match outcome {
        Some(result) => {
            handle.finish().await;
            result
        }
        None => {
            let reason = match handle.verdict().await {
                Some(WatchdogVerdict::Stuck) => StopReason::Stuck,
                _ => StopReason::HardTimeout,
            };
            info!("Session {} terminated by watchdog: {}", state.session_id, reason);
            state.phase = ExecutionPhase::Killed;
            state.mark_stopped(reason);
            // The aborted round never finished; its partial contributions
            // must not reach the store.
            state.discard_unsummarized_contributions();
            controller.persist(state).await?;
            Ok(())
        }
    }
}
