//! Bounded execution history and per-workflow last-run tracking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use engine::{ExecutionResult, TriggerType, WorkflowDefinition};
use queue::RingBuffer;

pub const MAX_HISTORY_RECORDS: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Final outcome of one run, retries included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// `<workflow-id>-<unix-ms>` of the trigger time.
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl ExecutionRecord {
    pub fn new(
        workflow: &WorkflowDefinition,
        trigger_type: TriggerType,
        triggered_at: DateTime<Utc>,
        result: &ExecutionResult,
        attempts: u32,
    ) -> Self {
        Self {
            id: format!("{}-{}", workflow.id, triggered_at.timestamp_millis()),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            triggered_at,
            completed_at: Utc::now(),
            trigger_type,
            success: result.success,
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub time: DateTime<Utc>,
    pub success: bool,
}

/// Append-only run history shared by the runner and the status API.
#[derive(Debug)]
pub struct ExecutionHistory {
    records: RingBuffer<ExecutionRecord>,
    last_runs: Mutex<HashMap<String, LastRun>>,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(MAX_HISTORY_RECORDS)
    }
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RingBuffer::new(capacity),
            last_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, record: ExecutionRecord) {
        self.last_runs.lock().insert(
            record.workflow_id.clone(),
            LastRun {
                time: record.completed_at,
                success: record.success,
            },
        );
        self.records.push(record);
    }

    /// Newest first, optionally restricted to one workflow.
    pub fn query(&self, workflow_id: Option<&str>, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .filtered(|r| workflow_id.map_or(true, |id| r.workflow_id == id), limit)
    }

    pub fn last_run(&self, workflow_id: &str) -> Option<LastRun> {
        self.last_runs.lock().get(workflow_id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(id: &str) -> WorkflowDefinition {
        serde_json::from_value(serde_json::json!({ "id": id, "name": id, "steps": [] })).unwrap()
    }

    fn record(history: &ExecutionHistory, id: &str, success: bool) {
        let result = if success {
            ExecutionResult { success: true, ..ExecutionResult::rejected(id, "") }
        } else {
            ExecutionResult::rejected(id, "boom")
        };
        history.record(ExecutionRecord::new(&workflow(id), TriggerType::Scheduled, Utc::now(), &result, 1));
    }

    #[test]
    fn query_filters_and_limits_newest_first() {
        let history = ExecutionHistory::new(10);
        record(&history, "a", true);
        record(&history, "b", false);
        record(&history, "a", false);

        let a = history.query(Some("a"), 10);
        assert_eq!(a.len(), 2);
        assert!(!a[0].success);
        assert!(a[1].success);
        assert_eq!(history.query(None, 1)[0].workflow_id, "a");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let history = ExecutionHistory::new(2);
        record(&history, "a", true);
        record(&history, "b", true);
        record(&history, "c", true);
        let ids: Vec<String> = history.query(None, 10).into_iter().map(|r| r.workflow_id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn last_run_tracks_latest_outcome() {
        let history = ExecutionHistory::default();
        assert!(history.last_run("a").is_none());
        record(&history, "a", true);
        record(&history, "a", false);
        assert_eq!(history.last_run("a").map(|r| r.success), Some(false));
    }

    #[test]
    fn record_id_combines_workflow_and_trigger_time() {
        let at = Utc::now();
        let rec = ExecutionRecord::new(&workflow("wf"), TriggerType::Manual, at, &ExecutionResult::rejected("wf", "x"), 1);
        assert_eq!(rec.id, format!("wf-{}", at.timestamp_millis()));
        assert_eq!(rec.trigger_type, TriggerType::Manual);
    }
}
