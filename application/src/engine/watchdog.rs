//! Session timeout supervision
//!
//! Two independent, monitoring-only timers per session: a hard wall-clock
//! ceiling that fires unconditionally, and a liveness window that is reset
//! only by meaningful-progress events. The watchdog runs as its own task and
//! never blocks phase execution; normal completion cancels it.

use conclave_domain::SessionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Progress signals the engine sends while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    ContributionProduced,
    PersonaSelected,
    SynthesisCompleted,
    VotingCompleted,
    DecompositionCompleted,
    ContextCompleted,
    SelectionCompleted,
    SubProblemStarted,
    /// Liveness-neutral signal; does not reset the stall timer.
    Heartbeat,
}

impl ProgressEvent {
    /// Only these kinds reset the liveness timer.
    pub fn is_meaningful(&self) -> bool {
        !matches!(self, ProgressEvent::Heartbeat)
    }
}

/// Why the watchdog force-terminated a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// The hard wall-clock ceiling elapsed.
    HardTimeout,
    /// No meaningful progress within the liveness window.
    Stuck,
}

#[derive(Debug, Clone)]
pub struct TimeoutWatchdog {
    hard_ceiling: Duration,
    liveness_window: Duration,
}

impl TimeoutWatchdog {
    pub fn new(hard_ceiling: Duration, liveness_window: Duration) -> Self {
        Self {
            hard_ceiling,
            liveness_window,
        }
    }

    /// Start supervising. The returned handle feeds progress events in and
    /// exposes a token that trips when either timer fires.
    pub fn spawn(&self, session_id: SessionId) -> WatchdogHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let cancel = CancellationToken::new();
        let tripped = CancellationToken::new();

        let hard_ceiling = self.hard_ceiling;
        let liveness_window = self.liveness_window;
        let task_cancel = cancel.clone();
        let task_tripped = tripped.clone();

        let task = tokio::spawn(async move {
            let hard_deadline = Instant::now() + hard_ceiling;
            let mut liveness_deadline = Instant::now() + liveness_window;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Watchdog for {} cancelled", session_id);
                        return None;
                    }
                    _ = sleep_until(hard_deadline) => {
                        info!("Session {} hit the hard ceiling", session_id);
                        task_tripped.cancel();
                        return Some(WatchdogVerdict::HardTimeout);
                    }
                    _ = sleep_until(liveness_deadline) => {
                        info!("Session {} is stuck: no progress for {:?}", session_id, liveness_window);
                        task_tripped.cancel();
                        return Some(WatchdogVerdict::Stuck);
                    }
                    event = rx.recv() => match event {
                        Some(e) if e.is_meaningful() => {
                            liveness_deadline = Instant::now() + liveness_window;
                        }
                        Some(_) => {}
                        // Sender side gone: the session finished on its own.
                        None => return None,
                    }
                }
            }
        });

        WatchdogHandle {
            progress: ProgressSender { tx: Some(tx) },
            cancel,
            tripped,
            task,
        }
    }
}

/// Cheap cloneable sender the engine uses to report progress.
///
/// A disabled sender (no watchdog attached) swallows events.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the watchdog already stopped; nothing to do.
            let _ = tx.send(event);
        }
    }
}

pub struct WatchdogHandle {
    progress: ProgressSender,
    cancel: CancellationToken,
    tripped: CancellationToken,
    task: JoinHandle<Option<WatchdogVerdict>>,
}

impl WatchdogHandle {
    pub fn progress(&self) -> ProgressSender {
        self.progress.clone()
    }

    /// Token that trips when either timer fires.
    pub fn tripped(&self) -> CancellationToken {
        self.tripped.clone()
    }

    /// Cancel on normal completion and collect the verdict, if any.
    pub async fn finish(self) -> Option<WatchdogVerdict> {
        self.cancel.cancel();
        self.task.await.unwrap_or(None)
    }

    /// Await the watchdog verdict after the trip token fired.
    pub async fn verdict(self) -> Option<WatchdogVerdict> {
        self.task.await.unwrap_or(None)
    }
}
