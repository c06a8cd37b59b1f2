//! Queue admission errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A manual trigger arrived while another task holds the execution slot.
    #[error("a task is already running, please wait. Current task: {workflow_name}")]
    Busy { task_id: String, workflow_name: String },
}
