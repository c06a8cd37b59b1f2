//! Structural validation, run before a workflow is scheduled or executed.
//!
//! Rules enforced:
//! 1. A workflow must have at least one step.
//! 2. Step IDs must be unique within the workflow.
//! 3. An enabled interval schedule must be at least one second.
//!
//! An enabled schedule with neither `cron` nor `interval` is not an error; it
//! simply never fires, and is reported back as a warning.

use std::collections::HashSet;

use crate::{models::WorkflowDefinition, EngineError};

/// Shortest interval the scheduler accepts, in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 1000;

/// Validate a workflow, returning non-fatal warnings on success.
///
/// # Errors
/// - [`EngineError::EmptyWorkflow`] if there are no steps.
/// - [`EngineError::DuplicateStepId`] if two steps share an ID.
/// - [`EngineError::InvalidSchedule`] if an enabled interval is too short.
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<Vec<String>, EngineError> {
    if workflow.steps.is_empty() {
        return Err(EngineError::EmptyWorkflow(workflow.id.clone()));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    let mut warnings = Vec::new();
    if let Some(schedule) = workflow.schedule.as_ref().filter(|s| s.enabled) {
        match (&schedule.cron, schedule.interval) {
            (None, None) => warnings.push(format!(
                "workflow '{}' has an enabled schedule with neither cron nor interval; it will never fire",
                workflow.id
            )),
            (None, Some(ms)) if ms < MIN_INTERVAL_MS => {
                return Err(EngineError::InvalidSchedule {
                    workflow_id: workflow.id.clone(),
                    message: format!("interval {ms}ms is below the {MIN_INTERVAL_MS}ms minimum"),
                });
            }
            _ => {}
        }
        if !workflow.enabled {
            warnings.push(format!(
                "workflow '{}' is disabled; its schedule is ignored",
                workflow.id
            ));
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Schedule, Step};
    use serde_json::json;

    fn step(id: &str) -> Step {
        Step {
            id: id.into(),
            name: id.into(),
            capability_type: "builtin".into(),
            instance: None,
            action: "echo".into(),
            params: json!({}),
            output_variable: None,
            condition: None,
        }
    }

    fn workflow(steps: Vec<Step>, schedule: Option<Schedule>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            name: "WF".into(),
            description: String::new(),
            enabled: true,
            builtin_variables: Default::default(),
            steps,
            user_inputs: vec![],
            schedule,
            reserved: false,
        }
    }

    #[test]
    fn valid_workflow_has_no_warnings() {
        let wf = workflow(vec![step("a"), step("b")], None);
        assert_eq!(validate_workflow(&wf), Ok(vec![]));
    }

    #[test]
    fn empty_and_duplicate_steps_are_rejected() {
        assert_eq!(
            validate_workflow(&workflow(vec![], None)),
            Err(EngineError::EmptyWorkflow("wf".into()))
        );
        assert_eq!(
            validate_workflow(&workflow(vec![step("a"), step("a")], None)),
            Err(EngineError::DuplicateStepId("a".into()))
        );
    }

    #[test]
    fn short_interval_is_rejected() {
        let schedule = Schedule { enabled: true, interval: Some(500), ..Default::default() };
        assert!(matches!(
            validate_workflow(&workflow(vec![step("a")], Some(schedule))),
            Err(EngineError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn short_interval_on_disabled_schedule_is_ignored() {
        let schedule = Schedule { enabled: false, interval: Some(500), ..Default::default() };
        assert_eq!(validate_workflow(&workflow(vec![step("a")], Some(schedule))), Ok(vec![]));
    }

    #[test]
    fn schedule_without_trigger_is_a_warning() {
        let schedule = Schedule { enabled: true, ..Default::default() };
        let warnings = validate_workflow(&workflow(vec![step("a")], Some(schedule))).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("never fire"));
    }
}
