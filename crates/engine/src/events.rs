//! Progress events emitted while a workflow runs.
//!
//! The executor reports through an [`ExecutionNotifier`]; callers that do not
//! care pass [`NoopNotifier`], streaming callers hand in a [`ChannelNotifier`]
//! and read the other end of the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::models::ExecutionResult;

/// One progress event. Serialized with a kebab-case `type` tag, e.g.
/// `{"type":"step-start","stepId":"fetch",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    StepStart {
        step_id: String,
        step_name: String,
        step_index: usize,
        total_steps: usize,
    },

    #[serde(rename_all = "camelCase")]
    StepComplete {
        step_id: String,
        step_name: String,
        step_index: usize,
        total_steps: usize,
        success: bool,
        #[serde(default)]
        skipped: bool,
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<String>,
        duration_ms: u64,
    },

    #[serde(rename_all = "camelCase")]
    StepError {
        step_id: String,
        step_name: String,
        step_index: usize,
        total_steps: usize,
        error: String,
        duration_ms: u64,
    },

    ExecutionComplete { result: ExecutionResult },

    ExecutionError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ExecutionResult>,
    },
}

impl ExecutionEvent {
    /// `execution-complete` and `execution-error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionComplete { .. } | ExecutionEvent::ExecutionError { .. }
        )
    }
}

/// Receives execution events. Implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
    fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
    fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { sender }
    }
}

impl ExecutionNotifier for ChannelNotifier {
    fn notify(&self, event: ExecutionEvent) {
        // The receiver may have gone away (client disconnected); the run goes on.
        let _ = self.sender.send(event);
    }
}
