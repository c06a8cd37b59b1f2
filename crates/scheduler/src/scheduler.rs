//! Timers that turn schedules into queued tasks.
//!
//! Each scheduled workflow owns exactly one tokio task, keyed by workflow id.
//! When it fires it does not execute anything itself; it enqueues a
//! scheduled task with the workflow's default inputs and goes back to
//! sleep. Whether it is safe to run is the queue's decision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use engine::WorkflowDefinition;
use queue::TaskQueue;

use crate::expression::{interval_period, parse_cron, parse_timezone, ScheduleError};
use crate::history::ExecutionHistory;

/// Schedule state of one workflow, for status display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    pub workflow_id: String,
    pub workflow_name: String,
    pub enabled: bool,
    /// A timer is currently installed for this workflow.
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<bool>,
}

type NextRun = Arc<Mutex<Option<DateTime<Utc>>>>;

struct ScheduleHandle {
    task: JoinHandle<()>,
    next_run: NextRun,
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns every schedule timer. Dropping it cancels them all.
pub struct Scheduler {
    queue: TaskQueue,
    history: Arc<ExecutionHistory>,
    default_timezone: Tz,
    handles: Mutex<HashMap<String, ScheduleHandle>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("scheduled", &self.scheduled_count())
            .finish()
    }
}

impl Scheduler {
    /// `default_timezone` applies to cron schedules that do not name a zone.
    pub fn new(queue: TaskQueue, history: Arc<ExecutionHistory>, default_timezone: Tz) -> Self {
        Self {
            queue,
            history,
            default_timezone,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Install timers for every active schedule in `workflows`. Schedules
    /// that fail to install are logged and skipped.
    pub fn initialize(&self, workflows: &[Arc<WorkflowDefinition>]) -> usize {
        for workflow in workflows.iter().filter(|w| w.is_schedule_active()) {
            if let Err(e) = self.schedule_workflow(Arc::clone(workflow)) {
                error!("failed to schedule workflow {}: {}", workflow.id, e);
            }
        }
        let count = self.scheduled_count();
        info!("initialized {} scheduled workflows", count);
        count
    }

    /// Drop every timer and install the given set from scratch.
    pub fn reload(&self, workflows: &[Arc<WorkflowDefinition>]) -> usize {
        self.clear_all_schedules();
        self.initialize(workflows)
    }

    /// (Re)install the timer for one workflow. Any previous timer for the same
    /// id is removed first, so calling this twice leaves one timer.
    ///
    /// Returns whether a timer is now installed.
    pub fn schedule_workflow(&self, workflow: Arc<WorkflowDefinition>) -> Result<bool, ScheduleError> {
        self.unschedule_workflow(&workflow.id);

        let Some(schedule) = workflow.schedule.clone().filter(|_| workflow.is_schedule_active()) else {
            return Ok(false);
        };

        let next_run: NextRun = Arc::new(Mutex::new(None));
        let task = if let Some(expr) = &schedule.cron {
            let cron = parse_cron(expr)?;
            let tz = match schedule.timezone.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(name) => parse_timezone(Some(name))?,
                None => self.default_timezone,
            };
            info!("scheduled cron job for workflow {}: {} ({})", workflow.id, expr, tz);
            tokio::spawn(run_cron(cron, tz, Arc::clone(&workflow), self.queue.clone(), Arc::clone(&next_run)))
        } else if let Some(ms) = schedule.interval {
            let period = interval_period(ms)?;
            info!("scheduled interval job for workflow {}: {}ms", workflow.id, ms);
            tokio::spawn(run_interval(
                period,
                Arc::clone(&workflow),
                self.queue.clone(),
                Arc::clone(&next_run),
            ))
        } else {
            warn!(
                "workflow {} has schedule enabled but no cron or interval defined",
                workflow.id
            );
            return Ok(false);
        };

        self.handles
            .lock()
            .insert(workflow.id.clone(), ScheduleHandle { task, next_run });
        Ok(true)
    }

    /// Remove the timer for `workflow_id`, if any.
    pub fn unschedule_workflow(&self, workflow_id: &str) -> bool {
        let removed = self.handles.lock().remove(workflow_id);
        if removed.is_some() {
            info!("removed schedule for workflow {}", workflow_id);
        }
        removed.is_some()
    }

    /// Remove every timer this scheduler owns.
    pub fn clear_all_schedules(&self) {
        let drained: Vec<_> = self.handles.lock().drain().collect();
        if !drained.is_empty() {
            info!("cleared {} schedules", drained.len());
        }
    }

    pub fn scheduled_count(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_scheduled(&self, workflow_id: &str) -> bool {
        self.handles.lock().contains_key(workflow_id)
    }

    pub fn next_run(&self, workflow_id: &str) -> Option<DateTime<Utc>> {
        self.handles
            .lock()
            .get(workflow_id)
            .and_then(|h| *h.next_run.lock())
    }

    /// Status of one workflow's schedule, or `None` if it has none.
    pub fn schedule_status(&self, workflow: &WorkflowDefinition) -> Option<ScheduleStatus> {
        let schedule = workflow.schedule.as_ref()?;
        let last = self.history.last_run(&workflow.id);
        Some(ScheduleStatus {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            enabled: schedule.enabled,
            active: self.is_scheduled(&workflow.id),
            cron: schedule.cron.clone(),
            interval: schedule.interval,
            timezone: schedule.timezone.clone(),
            next_run: self.next_run(&workflow.id),
            last_run: last.map(|l| l.time),
            last_success: last.map(|l| l.success),
        })
    }

    /// Status of every workflow that has a schedule.
    pub fn schedule_statuses(&self, workflows: &[Arc<WorkflowDefinition>]) -> Vec<ScheduleStatus> {
        workflows
            .iter()
            .filter_map(|w| self.schedule_status(w))
            .collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear_all_schedules();
    }
}

// ---------------------------------------------------------------------------
// Timer loops
// ---------------------------------------------------------------------------

fn fire(workflow: &Arc<WorkflowDefinition>, queue: &TaskQueue) {
    info!("enqueuing scheduled workflow: {}", workflow.id);
    queue.enqueue_scheduled(Arc::clone(workflow), workflow.default_inputs());
}

async fn run_cron(
    schedule: CronSchedule,
    tz: Tz,
    workflow: Arc<WorkflowDefinition>,
    queue: TaskQueue,
    next_run: NextRun,
) {
    // Never fire the same instant twice, even if the timer wakes early.
    let mut cursor = Utc::now();
    loop {
        let now = Utc::now().max(cursor);
        let Some(next) = schedule.after(&now.with_timezone(&tz)).next() else {
            warn!("cron schedule for workflow {} has no future occurrences", workflow.id);
            *next_run.lock() = None;
            return;
        };
        let next = next.with_timezone(&Utc);
        *next_run.lock() = Some(next);

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        cursor = next;
        fire(&workflow, &queue);
    }
}

async fn run_interval(
    period: Duration,
    workflow: Arc<WorkflowDefinition>,
    queue: TaskQueue,
    next_run: NextRun,
) {
    let Some(start) = Instant::now().checked_add(period) else {
        warn!("interval for workflow {} overflows the clock, not scheduling", workflow.id);
        return;
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        *next_run.lock() = chrono::Duration::from_std(period)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        ticker.tick().await;
        fire(&workflow, &queue);
    }
}
