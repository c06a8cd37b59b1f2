//! A single admitted unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use engine::{ExecutionResult, TriggerType, WorkflowDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One workflow run request, as shown in queue status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTask {
    /// `task-<unix-ms>-<6 chars>`.
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub trigger_type: TriggerType,
    pub inputs: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueuedTask {
    pub fn new(workflow: &WorkflowDefinition, trigger_type: TriggerType, inputs: Map<String, Value>) -> Self {
        Self {
            id: generate_task_id(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            trigger_type,
            inputs,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: TaskStatus::Queued,
            error: None,
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_finished(&mut self, result: &ExecutionResult) {
        self.completed_at = Some(Utc::now());
        if result.success {
            self.status = TaskStatus::Completed;
        } else {
            self.status = TaskStatus::Failed;
            self.error = result.error.clone();
        }
    }
}

fn generate_task_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("task-{}-{}", Utc::now().timestamp_millis(), &suffix[..6])
}
