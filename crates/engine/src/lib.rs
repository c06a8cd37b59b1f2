//! `engine` crate — workflow models, template resolution, condition
//! evaluation, validation and the step-by-step executor.

pub mod condition;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod template;
pub mod validate;

pub use condition::{ConditionError, ConditionFailurePolicy};
pub use context::{builtin_variable_catalog, BuiltinVariableInfo, ExecutionContext};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutorConfig, SkillExecutor};
pub use models::{
    BuiltinVariables, ExecutionResult, Schedule, Step, StepResult, TriggerType, UserInputField,
    WorkflowDefinition,
};
pub use validate::validate_workflow;

#[cfg(test)]
mod executor_tests;
