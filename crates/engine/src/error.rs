//! Engine-level error types.

use thiserror::Error;

use crate::condition::ConditionError;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// The workflow has nothing to run.
    #[error("workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    /// The embedded schedule can never fire correctly.
    #[error("invalid schedule for workflow '{workflow_id}': {message}")]
    InvalidSchedule { workflow_id: String, message: String },

    // ------ Execution errors ------

    /// A step failed; the rest of the pipeline was not run.
    #[error("Step {step_id} failed: {message}")]
    StepFailed { step_id: String, message: String },

    /// A step's guard expression could not be evaluated.
    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),
}
