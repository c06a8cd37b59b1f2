//! The built-in capability: in-process actions that need no external executor.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{Capability, CapabilityError, InvokeResult};

/// Type tag and default instance name of the built-in capability.
pub const BUILTIN_TYPE: &str = "builtin";

const ACTIONS: &[&str] = &["echo", "sleep", "fail"];

/// In-process capability.
///
/// - `echo`  — returns its params unchanged.
/// - `sleep` — waits `{ms}` milliseconds, returns `{slept: ms}`.
/// - `fail`  — answers unsuccessfully with `{message}`.
#[derive(Debug, Default, Clone)]
pub struct BuiltinCapability;

impl BuiltinCapability {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Capability for BuiltinCapability {
    fn capability_type(&self) -> &str {
        BUILTIN_TYPE
    }

    fn supported_actions(&self) -> Vec<String> {
        ACTIONS.iter().map(|a| a.to_string()).collect()
    }

    async fn invoke(&self, action: &str, params: Value) -> Result<InvokeResult, CapabilityError> {
        match action {
            "echo" => Ok(InvokeResult::ok(params)),
            "sleep" => {
                let ms = params.get("ms").and_then(value_as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(InvokeResult::ok(json!({ "slept": ms })))
            }
            "fail" => {
                let message = params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("failed by request");
                Ok(InvokeResult::failed(message))
            }
            other => Err(CapabilityError::UnsupportedAction {
                instance: BUILTIN_TYPE.into(),
                action: other.into(),
            }),
        }
    }
}

// Templated params arrive as strings, so "250" is accepted as well as 250.
fn value_as_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_params() {
        let result = BuiltinCapability::new()
            .invoke("echo", json!({ "a": [1, 2] }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(json!({ "a": [1, 2] })));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_accepts_string_millis() {
        let result = BuiltinCapability::new()
            .invoke("sleep", json!({ "ms": "1500" }))
            .await
            .unwrap();
        assert_eq!(result.data, Some(json!({ "slept": 1500 })));
    }

    #[tokio::test]
    async fn fail_answers_unsuccessfully() {
        let result = BuiltinCapability::new()
            .invoke("fail", json!({ "message": "nope" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("nope"));
    }
}
