//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They deserialize from the camelCase documents kept by the
//! configuration store; `executorType` / `executorName` are accepted as
//! aliases of `capabilityType` / `instance`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Trigger type
// ---------------------------------------------------------------------------

/// How an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Builtin variable toggles
// ---------------------------------------------------------------------------

/// Which builtin variables a workflow wants generated for each run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuiltinVariables {
    pub current_date: bool,
    pub current_time: bool,
    pub current_datetime: bool,
    pub random_id: bool,
}

// ---------------------------------------------------------------------------
// User inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Textarea,
    Select,
    Number,
    Checkbox,
}

/// A caller-supplied value the workflow expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Retry count used when `retryOnFailure` is set without `maxRetries`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// When a workflow runs on its own.
///
/// Exactly one of `cron` / `interval` is expected; `cron` wins if both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    /// 5- or 6-field cron expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Fixed period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// IANA zone name for cron evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Schedule {
    /// Additional attempts after the first failure.
    pub fn effective_max_retries(&self) -> u32 {
        if self.retry_on_failure {
            self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One capability invocation within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within the workflow; also a template key for this step's output.
    pub id: String,
    pub name: String,
    #[serde(alias = "executorType")]
    pub capability_type: String,
    /// Explicit instance name; otherwise the first enabled instance of the type.
    #[serde(default, alias = "executorName", skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub action: String,
    #[serde(default = "empty_object")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub builtin_variables: BuiltinVariables,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub user_inputs: Vec<UserInputField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Reserved workflows cannot be deleted by the configuration store.
    #[serde(default)]
    pub reserved: bool,
}

impl WorkflowDefinition {
    /// Inputs built from each field's `defaultValue`, used for scheduled runs.
    pub fn default_inputs(&self) -> Map<String, Value> {
        self.user_inputs
            .iter()
            .filter_map(|f| f.default_value.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }

    /// True when the workflow and its schedule are both switched on.
    pub fn is_schedule_active(&self) -> bool {
        self.enabled && self.schedule.as_ref().is_some_and(|s| s.enabled)
    }

    /// Additional attempts the retry policy allows for this workflow.
    pub fn max_retries(&self) -> u32 {
        self.schedule
            .as_ref()
            .map(Schedule::effective_max_retries)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one step. Skipped steps are successful with a null output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub step_name: String,
    pub success: bool,
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    pub duration_ms: u64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub workflow_id: String,
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A run that never reached the executor.
    pub fn rejected(workflow_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            workflow_id: workflow_id.into(),
            step_results: Vec::new(),
            final_output: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_legacy_executor_keys() {
        let step: Step = serde_json::from_value(json!({
            "id": "fetch",
            "name": "Fetch page",
            "executorType": "playwright",
            "executorName": "playwright-1",
            "action": "fetch",
            "params": { "url": "{{url}}" }
        }))
        .unwrap();
        assert_eq!(step.capability_type, "playwright");
        assert_eq!(step.instance.as_deref(), Some("playwright-1"));
    }

    #[test]
    fn missing_params_default_to_empty_object() {
        let step: Step = serde_json::from_value(json!({
            "id": "s", "name": "S", "capabilityType": "builtin", "action": "echo"
        }))
        .unwrap();
        assert_eq!(step.params, json!({}));
    }

    #[test]
    fn retry_budget_follows_flag() {
        let mut schedule = Schedule {
            enabled: true,
            interval: Some(60_000),
            ..Schedule::default()
        };
        assert_eq!(schedule.effective_max_retries(), 0);

        schedule.retry_on_failure = true;
        assert_eq!(schedule.effective_max_retries(), DEFAULT_MAX_RETRIES);

        schedule.max_retries = Some(5);
        assert_eq!(schedule.effective_max_retries(), 5);
    }

    #[test]
    fn default_inputs_only_include_fields_with_defaults() {
        let wf: WorkflowDefinition = serde_json::from_value(json!({
            "id": "wf",
            "name": "WF",
            "steps": [],
            "userInputs": [
                { "name": "url", "defaultValue": "https://x.test" },
                { "name": "topic", "required": true }
            ]
        }))
        .unwrap();
        let inputs = wf.default_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs["url"], "https://x.test");
        assert!(wf.enabled);
    }
}
