//! The `Capability` trait — the contract every executor instance must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CapabilityError;

/// Answer returned by a capability invocation.
///
/// Serialised as `{success, data?, error?, rawOutput?}`; the engine stores this
/// whole envelope as the step output, which is why templates address nested
/// fields as `{{step.data.field}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unparsed text produced by the executor (e.g. raw model output).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl InvokeResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    /// The envelope as a JSON object, without `rawOutput`.
    pub fn to_envelope(&self) -> Value {
        let mut envelope = serde_json::Map::new();
        envelope.insert("success".into(), Value::Bool(self.success));
        if let Some(data) = &self.data {
            envelope.insert("data".into(), data.clone());
        }
        if let Some(error) = &self.error {
            envelope.insert("error".into(), Value::String(error.clone()));
        }
        Value::Object(envelope)
    }
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            response_time_ms: None,
            message: Some("OK".into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            response_time_ms: None,
            message: Some(message.into()),
        }
    }
}

/// The core capability trait.
///
/// Browser drivers, chat backends, notification dispatchers and the built-in
/// capability all implement this; the engine only ever sees the trait object.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Type tag steps use to address this capability (`"playwright"`, `"builtin"`, …).
    fn capability_type(&self) -> &str;

    /// Actions this instance accepts. An empty list accepts every action.
    fn supported_actions(&self) -> Vec<String>;

    /// Invoke `action` with already-resolved `params`.
    async fn invoke(&self, action: &str, params: Value) -> Result<InvokeResult, CapabilityError>;

    /// Probe the instance. In-process capabilities are always healthy.
    async fn check_health(&self) -> HealthStatus {
        HealthStatus::healthy()
    }
}
