//! The composition root: one object that owns the catalog, queue,
//! scheduler and history, and exposes the trigger and status operations.

use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use capabilities::InstanceHealth;
use engine::{validate_workflow, ExecutionEvent, ExecutionResult, SkillExecutor, WorkflowDefinition};
use queue::{QueueError, QueueStatus, TaskQueue, DEFAULT_MAX_RECENT_TASKS};

use crate::expression::validate_schedule;
use crate::history::{ExecutionHistory, ExecutionRecord, MAX_HISTORY_RECORDS};
use crate::runner::RetryRunner;
use crate::scheduler::{ScheduleStatus, Scheduler};
use crate::source::{SourceError, WorkflowSource};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error(transparent)]
    Busy(#[from] QueueError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Buffer sizes and scheduling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub max_history: usize,
    pub max_recent_tasks: usize,
    /// Zone for cron schedules that do not name one.
    pub default_timezone: Tz,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY_RECORDS,
            max_recent_tasks: DEFAULT_MAX_RECENT_TASKS,
            default_timezone: chrono_tz::Asia::Shanghai,
        }
    }
}

/// Everything a caller needs to trigger and observe workflows.
///
/// Construction wires the pieces once: the queue runs tasks through a
/// [`RetryRunner`] that writes to the shared history, and the scheduler feeds
/// the queue. Nothing is injected after construction.
pub struct WorkflowService {
    source: Arc<dyn WorkflowSource>,
    workflows: RwLock<Vec<Arc<WorkflowDefinition>>>,
    executor: SkillExecutor,
    history: Arc<ExecutionHistory>,
    queue: TaskQueue,
    scheduler: Scheduler,
}

impl WorkflowService {
    pub fn new(source: Arc<dyn WorkflowSource>, executor: SkillExecutor, settings: ServiceSettings) -> Self {
        let history = Arc::new(ExecutionHistory::new(settings.max_history));
        let runner = Arc::new(RetryRunner::new(executor.clone(), Arc::clone(&history)));
        let queue = TaskQueue::new(runner, settings.max_recent_tasks);
        let scheduler = Scheduler::new(queue.clone(), Arc::clone(&history), settings.default_timezone);
        Self {
            source,
            workflows: RwLock::new(Vec::new()),
            executor,
            history,
            queue,
            scheduler,
        }
    }

    /// Load the catalog and install schedules. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<usize, ServiceError> {
        let workflows = self.load_catalog()?;
        Ok(self.scheduler.initialize(&schedulable(&workflows)))
    }

    /// Re-read the source and rebuild every schedule.
    pub fn reload(&self) -> Result<usize, ServiceError> {
        let workflows = self.load_catalog()?;
        let count = self.scheduler.reload(&schedulable(&workflows));
        info!("reloaded {} workflows, {} scheduled", workflows.len(), count);
        Ok(count)
    }

    /// Remove every schedule timer. Queued and running tasks are left alone.
    pub fn shutdown(&self) {
        self.scheduler.clear_all_schedules();
    }

    fn load_catalog(&self) -> Result<Vec<Arc<WorkflowDefinition>>, ServiceError> {
        let loaded: Vec<Arc<WorkflowDefinition>> =
            self.source.load()?.into_iter().map(Arc::new).collect();
        *self.workflows.write() = loaded.clone();
        Ok(loaded)
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    pub fn workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.workflows.read().clone()
    }

    pub fn workflow(&self, id: &str) -> Result<Arc<WorkflowDefinition>, ServiceError> {
        self.workflows
            .read()
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::WorkflowNotFound(id.to_owned()))
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Run a workflow now. `None` inputs means "use each field's default".
    pub async fn run_now(
        &self,
        workflow_id: &str,
        inputs: Option<Map<String, Value>>,
    ) -> Result<ExecutionResult, ServiceError> {
        let workflow = self.workflow(workflow_id)?;
        let inputs = inputs.unwrap_or_else(|| workflow.default_inputs());
        info!("manually triggering workflow: {}", workflow.id);
        Ok(self.queue.run_manual(workflow, inputs).await?)
    }

    /// Run a workflow now and stream its progress.
    pub fn run_now_streaming(
        &self,
        workflow_id: &str,
        inputs: Option<Map<String, Value>>,
    ) -> Result<mpsc::UnboundedReceiver<ExecutionEvent>, ServiceError> {
        let workflow = self.workflow(workflow_id)?;
        let inputs = inputs.unwrap_or_else(|| workflow.default_inputs());
        info!("manually triggering workflow with events: {}", workflow.id);
        Ok(self.queue.run_manual_streaming(workflow, inputs)?)
    }

    pub fn cancel(&self, task_id: &str) -> bool {
        self.queue.cancel(task_id)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn schedule_status(&self, workflow_id: &str) -> Result<Option<ScheduleStatus>, ServiceError> {
        let workflow = self.workflow(workflow_id)?;
        Ok(self.scheduler.schedule_status(&workflow))
    }

    pub fn schedule_statuses(&self) -> Vec<ScheduleStatus> {
        self.scheduler.schedule_statuses(&self.workflows())
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    pub fn history(&self, workflow_id: Option<&str>, limit: usize) -> Vec<ExecutionRecord> {
        self.history.query(workflow_id, limit)
    }

    pub async fn capability_health(&self) -> Vec<InstanceHealth> {
        self.executor.registry().check_all_health().await
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

/// Workflows that pass validation; the rest are logged and left unscheduled.
fn schedulable(workflows: &[Arc<WorkflowDefinition>]) -> Vec<Arc<WorkflowDefinition>> {
    workflows
        .iter()
        .filter(|w| {
            match validate_workflow(w) {
                Ok(warnings) => warnings.iter().for_each(|msg| warn!("{}", msg)),
                Err(e) => {
                    error!("workflow {} is invalid and will not be scheduled: {}", w.id, e);
                    return false;
                }
            }
            if let Err(e) = validate_schedule(w) {
                error!("workflow {} has an invalid schedule: {}", w.id, e);
                return false;
            }
            true
        })
        .cloned()
        .collect()
}
