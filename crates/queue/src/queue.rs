//! Single-slot task queue.
//!
//! At most one task holds the execution slot (`current`) at any time.
//! Scheduled tasks are appended to a FIFO and drained in order; manual
//! triggers either take the free slot immediately or are rejected with
//! [`QueueError::Busy`]. They are never queued behind scheduled work.
//!
//! Every admission decision is a check-and-set under one lock, so two
//! concurrent admissions cannot both observe a free slot.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{error, info};

use engine::{ExecutionEvent, ExecutionNotifier, ExecutionResult, TriggerType, WorkflowDefinition};

use crate::error::QueueError;
use crate::ring::RingBuffer;
use crate::runner::TaskRunner;
use crate::task::QueuedTask;

/// Finished tasks kept for status display.
pub const DEFAULT_MAX_RECENT_TASKS: usize = 10;

/// Snapshot returned by [`TaskQueue::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub current_task: Option<QueuedTask>,
    pub queued_tasks: Vec<QueuedTask>,
    /// Newest first.
    pub recent_tasks: Vec<QueuedTask>,
}

struct Pending {
    task: QueuedTask,
    workflow: Arc<WorkflowDefinition>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    current: Option<QueuedTask>,
    draining: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    recent: RingBuffer<QueuedTask>,
    runner: Arc<dyn TaskRunner>,
}

/// Handle to the queue. Clones share the same slot and FIFO.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskQueue")
            .field("current", &state.current.as_ref().map(|t| &t.id))
            .field("queued", &state.pending.len())
            .finish()
    }
}

impl TaskQueue {
    pub fn new(runner: Arc<dyn TaskRunner>, max_recent_tasks: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                recent: RingBuffer::new(max_recent_tasks),
                runner,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Append a scheduled run to the FIFO. Always succeeds.
    ///
    /// The definition is captured now; a later reload does not change what
    /// an already-queued task runs.
    pub fn enqueue_scheduled(
        &self,
        workflow: Arc<WorkflowDefinition>,
        inputs: Map<String, Value>,
    ) -> QueuedTask {
        let task = QueuedTask::new(&workflow, TriggerType::Scheduled, inputs);
        let queued = {
            let mut state = self.shared.state.lock();
            state.pending.push_back(Pending {
                task: task.clone(),
                workflow,
            });
            state.pending.len()
        };
        info!(
            "scheduled task enqueued: {} ({}), queue length: {}",
            task.id, task.workflow_name, queued
        );
        self.shared.kick();
        task
    }

    /// Run a manual trigger now, or fail with `Busy` if the slot is taken.
    ///
    /// The run is detached from the caller: dropping the returned future
    /// does not abandon the slot.
    pub async fn run_manual(
        &self,
        workflow: Arc<WorkflowDefinition>,
        inputs: Map<String, Value>,
    ) -> Result<ExecutionResult, QueueError> {
        let task = self.shared.admit_manual(&workflow, inputs)?;
        info!("manual task started: {} ({})", task.id, task.workflow_name);

        let shared = Arc::clone(&self.shared);
        let workflow_id = workflow.id.clone();
        match tokio::spawn(async move { shared.execute(workflow, task).await }).await {
            Ok(result) => Ok(result),
            Err(e) => Ok(ExecutionResult::rejected(workflow_id, format!("run aborted: {e}"))),
        }
    }

    /// Like [`run_manual`](Self::run_manual), but streams progress events.
    ///
    /// The busy check happens before this returns. The channel yields every
    /// step event followed by exactly one terminal event, which is sent only
    /// after the slot has been released.
    pub fn run_manual_streaming(
        &self,
        workflow: Arc<WorkflowDefinition>,
        inputs: Map<String, Value>,
    ) -> Result<mpsc::UnboundedReceiver<ExecutionEvent>, QueueError> {
        let task = self.shared.admit_manual(&workflow, inputs)?;
        info!("manual task with events started: {} ({})", task.id, task.workflow_name);

        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(DeferredTerminal::new(tx));
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let run = {
                let shared = Arc::clone(&shared);
                let notifier = Arc::clone(&notifier);
                let workflow = Arc::clone(&workflow);
                let task = task.clone();
                tokio::spawn(async move {
                    shared
                        .runner
                        .run_streaming(&workflow, &task, notifier.as_ref())
                        .await
                })
            };
            let result = run.await.unwrap_or_else(|e| {
                error!("streaming task {} aborted: {}", task.id, e);
                ExecutionResult::rejected(workflow.id.clone(), format!("run aborted: {e}"))
            });
            shared.finish(task, &result);
            notifier.flush(result);
        });

        Ok(rx)
    }

    // -----------------------------------------------------------------------
    // Inspection and cancellation
    // -----------------------------------------------------------------------

    /// Remove a task that has not started yet. Running tasks cannot be
    /// cancelled.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut state = self.shared.state.lock();
        let Some(index) = state.pending.iter().position(|p| p.task.id == task_id) else {
            return false;
        };
        state.pending.remove(index);
        info!("cancelled queued task: {}", task_id);
        true
    }

    pub fn status(&self) -> QueueStatus {
        let (current_task, queued_tasks) = {
            let state = self.shared.state.lock();
            (
                state.current.clone(),
                state.pending.iter().map(|p| p.task.clone()).collect(),
            )
        };
        QueueStatus {
            current_task,
            queued_tasks,
            recent_tasks: self.shared.recent.snapshot(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().current.is_some()
    }

    pub fn current_task(&self) -> Option<QueuedTask> {
        self.shared.state.lock().current.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

// ---------------------------------------------------------------------------
// Slot discipline and drain loop
// ---------------------------------------------------------------------------

impl Shared {
    fn admit_manual(
        &self,
        workflow: &WorkflowDefinition,
        inputs: Map<String, Value>,
    ) -> Result<QueuedTask, QueueError> {
        let mut state = self.state.lock();
        if let Some(current) = &state.current {
            return Err(QueueError::Busy {
                task_id: current.id.clone(),
                workflow_name: current.workflow_name.clone(),
            });
        }
        let mut task = QueuedTask::new(workflow, TriggerType::Manual, inputs);
        task.mark_running();
        state.current = Some(task.clone());
        Ok(task)
    }

    /// Run a task that already holds the slot, then release it.
    async fn execute(self: &Arc<Self>, workflow: Arc<WorkflowDefinition>, task: QueuedTask) -> ExecutionResult {
        let run = {
            let shared = Arc::clone(self);
            let task = task.clone();
            tokio::spawn(async move { shared.runner.run(&workflow, &task).await })
        };
        let result = run.await.unwrap_or_else(|e| {
            error!("task {} aborted: {}", task.id, e);
            ExecutionResult::rejected(task.workflow_id.clone(), format!("run aborted: {e}"))
        });
        self.finish(task, &result);
        result
    }

    /// Record the outcome, free the slot and resume draining.
    fn finish(self: &Arc<Self>, mut task: QueuedTask, result: &ExecutionResult) {
        task.mark_finished(result);
        if let Some(err) = &task.error {
            error!("task {} ({}) failed: {}", task.id, task.workflow_name, err);
        } else {
            info!("task {} ({}) completed", task.id, task.workflow_name);
        }
        self.recent.push(task);
        self.state.lock().current = None;
        self.kick();
    }

    /// Start the drain loop unless it is already running or has nothing to do.
    fn kick(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.draining || state.current.is_some() || state.pending.is_empty() {
                return;
            }
            state.draining = true;
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.drain().await });
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let (workflow, task, remaining) = {
                let mut state = self.state.lock();
                if state.current.is_some() {
                    state.draining = false;
                    return;
                }
                let Some(Pending { mut task, workflow }) = state.pending.pop_front() else {
                    state.draining = false;
                    return;
                };
                task.mark_running();
                state.current = Some(task.clone());
                (workflow, task, state.pending.len())
            };
            info!(
                "processing queued task: {} ({}), remaining: {}",
                task.id, task.workflow_name, remaining
            );
            self.execute(workflow, task).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming notifier
// ---------------------------------------------------------------------------

/// Forwards step events immediately and holds the terminal event back until
/// [`flush`](Self::flush), so a consumer that sees the end of the stream also
/// sees a free slot.
struct DeferredTerminal {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
    terminal: Mutex<Option<ExecutionEvent>>,
}

impl DeferredTerminal {
    fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self {
            sender,
            terminal: Mutex::new(None),
        }
    }

    fn flush(&self, result: ExecutionResult) {
        let event = self.terminal.lock().take().unwrap_or_else(|| {
            if result.success {
                ExecutionEvent::ExecutionComplete { result }
            } else {
                ExecutionEvent::ExecutionError {
                    error: result.error.clone().unwrap_or_default(),
                    result: Some(result),
                }
            }
        });
        let _ = self.sender.send(event);
    }
}

impl ExecutionNotifier for DeferredTerminal {
    fn notify(&self, event: ExecutionEvent) {
        if event.is_terminal() {
            let mut terminal = self.terminal.lock();
            if terminal.is_none() {
                *terminal = Some(event);
            }
            return;
        }
        let _ = self.sender.send(event);
    }
}
