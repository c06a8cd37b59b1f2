//! `MockCapability` — a test double for `Capability`.
//!
//! Useful in unit and integration tests where a real executor is either
//! unavailable or irrelevant. Every call is recorded, and the mock tracks how
//! many invocations were in flight at once so single-flight guarantees can be
//! asserted from the outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{Capability, CapabilityError, InvokeResult};

/// Behaviour injected into `MockCapability` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with the given `data`.
    ReturnValue(Value),
    /// Answer with an unsuccessful `InvokeResult`.
    FailResult(String),
    /// Fail at the transport level.
    FailTransport(String),
    /// Answer unsuccessfully for the first `failures` calls, then succeed.
    FailThenReturn { failures: usize, value: Value },
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub action: String,
    pub params: Value,
}

/// A mock capability that records every call it receives and returns a
/// programmer-specified result.
pub struct MockCapability {
    capability_type: String,
    actions: Vec<String>,
    behaviour: MockBehaviour,
    per_action: HashMap<String, MockBehaviour>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCapability {
    fn with_behaviour(capability_type: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            capability_type: capability_type.into(),
            actions: Vec::new(),
            behaviour,
            per_action: HashMap::new(),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always succeeds with the given data.
    pub fn returning(capability_type: impl Into<String>, data: Value) -> Self {
        Self::with_behaviour(capability_type, MockBehaviour::ReturnValue(data))
    }

    /// Create a mock that always answers `{success: false, error}`.
    pub fn failing(capability_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_behaviour(capability_type, MockBehaviour::FailResult(error.into()))
    }

    /// Create a mock whose every call fails at the transport level.
    pub fn unreachable(capability_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_behaviour(capability_type, MockBehaviour::FailTransport(error.into()))
    }

    /// Create a mock that fails `failures` times before succeeding with `data`.
    pub fn flaky(capability_type: impl Into<String>, failures: usize, data: Value) -> Self {
        Self::with_behaviour(
            capability_type,
            MockBehaviour::FailThenReturn { failures, value: data },
        )
    }

    /// Restrict the advertised actions.
    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Override the behaviour for a single action.
    pub fn on_action(mut self, action: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.per_action.insert(action.into(), behaviour);
        self
    }

    /// Sleep for `delay` inside every invocation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this capability has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// All calls seen so far, in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Highest number of concurrent invocations observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for MockCapability {
    fn capability_type(&self) -> &str {
        &self.capability_type
    }

    fn supported_actions(&self) -> Vec<String> {
        self.actions.clone()
    }

    async fn invoke(&self, action: &str, params: Value) -> Result<InvokeResult, CapabilityError> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(MockCall {
                action: action.to_owned(),
                params,
            });
            calls.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let behaviour = self.per_action.get(action).unwrap_or(&self.behaviour);
        match behaviour {
            MockBehaviour::ReturnValue(v) => Ok(InvokeResult::ok(v.clone())),
            MockBehaviour::FailResult(msg) => Ok(InvokeResult::failed(msg.clone())),
            MockBehaviour::FailTransport(msg) => Err(CapabilityError::Transport(msg.clone())),
            MockBehaviour::FailThenReturn { failures, value } => {
                if call_index <= *failures {
                    Ok(InvokeResult::failed(format!("transient failure #{call_index}")))
                } else {
                    Ok(InvokeResult::ok(value.clone()))
                }
            }
        }
    }
}
