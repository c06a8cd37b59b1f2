//! Where workflow definitions come from.

use parking_lot::RwLock;
use thiserror::Error;

use engine::WorkflowDefinition;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to load workflows: {0}")]
    Load(String),
}

/// Pull-callback supplying the current workflow definitions.
///
/// Called at start-up and on every reload; storage stays with the
/// implementation.
pub trait WorkflowSource: Send + Sync {
    fn load(&self) -> Result<Vec<WorkflowDefinition>, SourceError>;
}

/// An in-memory source whose contents can be swapped between reloads.
#[derive(Debug, Default)]
pub struct StaticSource {
    workflows: RwLock<Vec<WorkflowDefinition>>,
}

impl StaticSource {
    pub fn new(workflows: Vec<WorkflowDefinition>) -> Self {
        Self {
            workflows: RwLock::new(workflows),
        }
    }

    pub fn replace(&self, workflows: Vec<WorkflowDefinition>) {
        *self.workflows.write() = workflows;
    }
}

impl WorkflowSource for StaticSource {
    fn load(&self) -> Result<Vec<WorkflowDefinition>, SourceError> {
        Ok(self.workflows.read().clone())
    }
}
