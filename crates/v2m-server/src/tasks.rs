//! Conversion task manager.
//!
//! Each accepted task gets its own driver that starts the encoder,
//! relays progress samples to the owning connection's event channel, and
//! emits exactly one terminal event. Cancellation transitions the
//! registry entry immediately; the driver observes the already-terminal
//! state and suppresses its own terminal emission, so a task can never
//! produce two terminal events or a Failed event after a cancel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

use v2m_media::{start_encode, EncodeEvent, EncodeOutcome};
use v2m_models::{ConnectionId, ConvertOptions, ServerEvent, TaskId, TaskState};

use crate::error::{ServerError, ServerResult};

struct TaskEntry {
    state: TaskState,
    connection: ConnectionId,
    cancel: watch::Sender<bool>,
}

/// Result of a cancel request against a live task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task transitioned to Cancelled.
    Cancelled,
    /// The task was already terminal; nothing changed.
    AlreadyFinished,
}

/// Owns all live conversion tasks.
pub struct TaskManager {
    registry: Mutex<HashMap<TaskId, TaskEntry>>,
    // Fair, so queued Pending tasks start in submission order.
    semaphore: Arc<Semaphore>,
}

impl TaskManager {
    /// Create a manager capping concurrently Running tasks.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Accept a conversion request.
    ///
    /// Enqueues the `task_started` acknowledgment before the driver is
    /// spawned; since all of a connection's events flow through one FIFO
    /// channel, the acknowledgment always precedes the first progress
    /// event.
    pub async fn spawn_convert(
        self: Arc<Self>,
        connection: ConnectionId,
        events: mpsc::Sender<ServerEvent>,
        input: PathBuf,
        output: PathBuf,
        options: ConvertOptions,
    ) -> TaskId {
        let task_id = TaskId::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.registry.lock().unwrap().insert(
            task_id.clone(),
            TaskEntry {
                state: TaskState::Pending,
                connection,
                cancel: cancel_tx,
            },
        );

        let _ = events.send(ServerEvent::task_started(task_id.clone())).await;

        let id = task_id.clone();
        tokio::spawn(async move {
            self.drive(id, events, cancel_rx, input, output, options)
                .await;
        });

        task_id
    }

    /// Cancel a task. Idempotent on live tasks; unknown ids fail.
    pub fn cancel(&self, task_id: &TaskId) -> ServerResult<CancelOutcome> {
        let mut registry = self.registry.lock().unwrap();
        let entry = registry
            .get_mut(task_id)
            .ok_or_else(|| ServerError::UnknownTask(task_id.clone()))?;

        if entry.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished);
        }

        entry.state = TaskState::Cancelled;
        let _ = entry.cancel.send(true);
        info!("task {} cancelled", task_id);
        Ok(CancelOutcome::Cancelled)
    }

    /// Cancel every live task owned by a closed connection. No events
    /// are emitted; the connection is gone. Returns the number of tasks
    /// cancelled.
    pub fn cancel_connection(&self, connection: ConnectionId) -> usize {
        let mut registry = self.registry.lock().unwrap();
        let mut cancelled = 0;
        for (task_id, entry) in registry.iter_mut() {
            if entry.connection == connection && !entry.state.is_terminal() {
                entry.state = TaskState::Cancelled;
                let _ = entry.cancel.send(true);
                debug!("task {} cancelled by connection closure", task_id);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Current state of a live task, if any.
    pub fn task_state(&self, task_id: &TaskId) -> Option<TaskState> {
        self.registry.lock().unwrap().get(task_id).map(|e| e.state)
    }

    /// Number of live tasks.
    pub fn task_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    async fn drive(
        self: Arc<Self>,
        task_id: TaskId,
        events: mpsc::Sender<ServerEvent>,
        mut cancel_rx: watch::Receiver<bool>,
        input: PathBuf,
        output: PathBuf,
        options: ConvertOptions,
    ) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        // Cancelled while queued: the terminal event was already emitted
        // by cancel(), just drop the entry.
        if !self.transition_to_running(&task_id) {
            self.registry.lock().unwrap().remove(&task_id);
            return;
        }

        let mut handle = match start_encode(&input, &output, &options).await {
            Ok(handle) => handle,
            Err(e) => {
                self.finish(
                    &task_id,
                    &events,
                    EncodeOutcome::Failure {
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        let kill = handle.kill_switch();
        let mut killed = false;
        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(EncodeEvent::Progress(sample)) => {
                        // Suppressed once the task left Running (cancel
                        // raced with a sample still in flight).
                        if self.task_state(&task_id) == Some(TaskState::Running) {
                            let _ = events
                                .send(ServerEvent::task_progress(
                                    task_id.clone(),
                                    sample.percentage(),
                                    sample.encoded_secs,
                                    sample.total_secs,
                                ))
                                .await;
                        }
                    }
                    Some(EncodeEvent::Finished(outcome)) => {
                        self.finish(&task_id, &events, outcome).await;
                        break;
                    }
                    None => {
                        warn!("task {}: encoder stream ended without a result", task_id);
                        self.finish(
                            &task_id,
                            &events,
                            EncodeOutcome::Failure {
                                message: "encoder stream ended unexpectedly".to_string(),
                            },
                        )
                        .await;
                        break;
                    }
                },
                changed = cancel_rx.changed(), if !killed => {
                    killed = true;
                    if changed.is_ok() && *cancel_rx.borrow() {
                        kill.kill();
                    }
                }
            }
        }
    }

    /// Pending -> Running, unless the task was cancelled while queued.
    fn transition_to_running(&self, task_id: &TaskId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        match registry.get_mut(task_id) {
            Some(entry) if entry.state == TaskState::Pending => {
                entry.state = TaskState::Running;
                true
            }
            _ => false,
        }
    }

    /// Emit the terminal event (at most once) and evict the task.
    async fn finish(
        &self,
        task_id: &TaskId,
        events: &mpsc::Sender<ServerEvent>,
        outcome: EncodeOutcome,
    ) {
        let prior = {
            let mut registry = self.registry.lock().unwrap();
            match registry.remove(task_id) {
                Some(entry) => entry.state,
                None => return,
            }
        };

        // cancel() already delivered the task's terminal event.
        if prior == TaskState::Cancelled {
            return;
        }

        let event = match outcome {
            EncodeOutcome::Success { output } => {
                info!("task {} completed: {}", task_id, output.display());
                ServerEvent::task_completed(task_id.clone(), output.display().to_string())
            }
            EncodeOutcome::Failure { message } => {
                warn!("task {} failed: {}", task_id, message);
                ServerEvent::task_failed(task_id.clone(), message)
            }
            // Killed without a cancel() transition only happens when the
            // entry is already gone; nothing to report.
            EncodeOutcome::Cancelled => return,
        };

        let _ = events.send(event).await;
    }
}
