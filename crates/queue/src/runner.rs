//! The callback the queue uses to actually run a task.

use async_trait::async_trait;

use engine::{ExecutionNotifier, ExecutionResult, NoopNotifier, SkillExecutor, WorkflowDefinition};

use crate::task::QueuedTask;

/// Runs one admitted task to completion.
///
/// The queue owns *when* a task runs; implementations own *how* (retries,
/// history bookkeeping). Implementations must not touch queue state.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run the task. Used by the drain loop and by plain manual triggers.
    async fn run(&self, workflow: &WorkflowDefinition, task: &QueuedTask) -> ExecutionResult;

    /// Run the task once, reporting progress to `notifier`.
    async fn run_streaming(
        &self,
        workflow: &WorkflowDefinition,
        task: &QueuedTask,
        notifier: &dyn ExecutionNotifier,
    ) -> ExecutionResult;
}

/// Single-attempt runner straight on top of a [`SkillExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorRunner {
    executor: SkillExecutor,
}

impl ExecutorRunner {
    pub fn new(executor: SkillExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TaskRunner for ExecutorRunner {
    async fn run(&self, workflow: &WorkflowDefinition, task: &QueuedTask) -> ExecutionResult {
        self.run_streaming(workflow, task, &NoopNotifier).await
    }

    async fn run_streaming(
        &self,
        workflow: &WorkflowDefinition,
        task: &QueuedTask,
        notifier: &dyn ExecutionNotifier,
    ) -> ExecutionResult {
        self.executor
            .execute_with_notifier(workflow, task.inputs.clone(), notifier)
            .await
    }
}
