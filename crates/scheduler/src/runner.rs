//! Direct execution with the workflow's retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use engine::{ExecutionNotifier, ExecutionResult, SkillExecutor, WorkflowDefinition};
use queue::{QueuedTask, TaskRunner};

use crate::history::{ExecutionHistory, ExecutionRecord};

/// Runs a task through the executor, retrying whole-workflow failures when
/// the schedule asks for it, and writes exactly one [`ExecutionRecord`] per
/// task for the final outcome.
#[derive(Debug, Clone)]
pub struct RetryRunner {
    executor: SkillExecutor,
    history: Arc<ExecutionHistory>,
}

impl RetryRunner {
    pub fn new(executor: SkillExecutor, history: Arc<ExecutionHistory>) -> Self {
        Self { executor, history }
    }

    fn finish(&self, workflow: &WorkflowDefinition, task: &QueuedTask, started: chrono::DateTime<Utc>, result: &ExecutionResult, attempts: u32) {
        self.history.record(ExecutionRecord::new(
            workflow,
            task.trigger_type,
            started,
            result,
            attempts,
        ));
        if result.success {
            info!("workflow {} completed successfully", workflow.id);
        } else {
            error!(
                "workflow {} failed: {}",
                workflow.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

#[async_trait]
impl TaskRunner for RetryRunner {
    #[instrument(skip_all, fields(workflow_id = %workflow.id, task_id = %task.id))]
    async fn run(&self, workflow: &WorkflowDefinition, task: &QueuedTask) -> ExecutionResult {
        let started = Utc::now();
        let max_retries = workflow.max_retries();
        let mut attempt = 0u32;

        let result = loop {
            if attempt > 0 {
                warn!("retrying workflow {}, attempt {}/{}", workflow.id, attempt, max_retries);
            }
            let result = self.executor.execute(workflow, task.inputs.clone()).await;
            if result.success || attempt >= max_retries {
                break result;
            }
            attempt += 1;
        };

        self.finish(workflow, task, started, &result, attempt + 1);
        result
    }

    async fn run_streaming(
        &self,
        workflow: &WorkflowDefinition,
        task: &QueuedTask,
        notifier: &dyn ExecutionNotifier,
    ) -> ExecutionResult {
        let started = Utc::now();
        let result = self
            .executor
            .execute_with_notifier(workflow, task.inputs.clone(), notifier)
            .await;
        self.finish(workflow, task, started, &result, 1);
        result
    }
}
