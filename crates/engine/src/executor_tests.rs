//! Tests for the workflow execution engine.
//!
//! Every capability here is a `MockCapability`, so no executor process or
//! network is needed.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use capabilities::mock::MockCapability;
use capabilities::{BuiltinCapability, CapabilityRegistry, BUILTIN_TYPE};

use crate::condition::ConditionFailurePolicy;
use crate::events::{ChannelNotifier, ExecutionEvent};
use crate::executor::{ExecutorConfig, SkillExecutor};
use crate::models::{Step, WorkflowDefinition};

fn step(id: &str, capability_type: &str, params: Value) -> Step {
    Step {
        id: id.into(),
        name: format!("Step {id}"),
        capability_type: capability_type.into(),
        instance: None,
        action: "run".into(),
        params,
        output_variable: None,
        condition: None,
    }
}

fn workflow(steps: Vec<Step>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: "wf-test".into(),
        name: "Test workflow".into(),
        description: String::new(),
        enabled: true,
        builtin_variables: Default::default(),
        steps,
        user_inputs: vec![],
        schedule: None,
        reserved: false,
    }
}

fn executor(registry: CapabilityRegistry) -> SkillExecutor {
    SkillExecutor::new(Arc::new(registry), ExecutorConfig::default())
}

fn inputs(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ============================================================
// Pipeline semantics
// ============================================================

#[tokio::test]
async fn fetch_then_summarize_threads_output_into_params() {
    let fetch = Arc::new(MockCapability::returning("playwright", json!({ "textContent": "hello" })));
    let chat = Arc::new(MockCapability::returning("chat", json!({ "summary": "hi" })));

    let mut registry = CapabilityRegistry::new();
    registry.register("pw-1", true, fetch.clone());
    registry.register("chat-1", true, chat.clone());

    let wf = workflow(vec![
        step("fetch", "playwright", json!({ "url": "{{url}}" })),
        step("summarize", "chat", json!({ "text": "{{fetch.data.textContent}}" })),
    ]);

    let result = executor(registry)
        .execute(&wf, inputs(&[("url", json!("https://x.test"))]))
        .await;

    assert!(result.success, "run failed: {:?}", result.error);
    assert_eq!(fetch.calls()[0].params, json!({ "url": "https://x.test" }));
    assert_eq!(chat.calls()[0].params, json!({ "text": "hello" }));
    assert_eq!(
        result.final_output,
        Some(json!({ "success": true, "data": { "summary": "hi" } }))
    );
    assert_eq!(result.step_results.len(), 2);
}

#[tokio::test]
async fn final_output_prefers_output_variable_of_last_step() {
    let mut registry = CapabilityRegistry::new();
    registry.register(BUILTIN_TYPE, true, Arc::new(BuiltinCapability::new()));

    let mut last = step("second", BUILTIN_TYPE, json!({ "n": 2 }));
    last.action = "echo".into();
    last.output_variable = Some("answer".into());
    let mut first = step("first", BUILTIN_TYPE, json!({ "n": 1 }));
    first.action = "echo".into();

    let result = executor(registry).execute(&workflow(vec![first, last]), Map::new()).await;
    assert_eq!(result.final_output, Some(json!({ "success": true, "data": { "n": 2 } })));
}

#[tokio::test]
async fn failing_step_aborts_remaining_steps() {
    let ok = Arc::new(MockCapability::returning("ok", json!(1)));
    let bad = Arc::new(MockCapability::failing("bad", "remote exploded"));
    let never = Arc::new(MockCapability::returning("never", json!(3)));

    let mut registry = CapabilityRegistry::new();
    registry.register("ok-1", true, ok.clone());
    registry.register("bad-1", true, bad.clone());
    registry.register("never-1", true, never.clone());

    let wf = workflow(vec![
        step("one", "ok", json!({})),
        step("two", "bad", json!({})),
        step("three", "never", json!({})),
    ]);

    let result = executor(registry).execute(&wf, Map::new()).await;

    assert!(!result.success);
    assert_eq!(result.step_results.len(), 2);
    assert!(!result.step_results[1].success);
    assert_eq!(result.step_results[1].error.as_deref(), Some("remote exploded"));
    assert_eq!(result.error.as_deref(), Some("Step two failed: remote exploded"));
    assert_eq!(result.final_output, None);
    assert_eq!(never.call_count(), 0);
}

#[tokio::test]
async fn missing_capability_instance_is_the_runs_error() {
    let wf = workflow(vec![step("fetch", "playwright", json!({}))]);
    let result = executor(CapabilityRegistry::new()).execute(&wf, Map::new()).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("Step fetch failed: "), "{error}");
    assert!(error.contains("playwright"), "{error}");
}

#[tokio::test]
async fn transport_error_fails_the_step() {
    let mut registry = CapabilityRegistry::new();
    registry.register("pw-1", true, Arc::new(MockCapability::unreachable("playwright", "connection refused")));

    let result = executor(registry)
        .execute(&workflow(vec![step("fetch", "playwright", json!({}))]), Map::new())
        .await;
    assert!(result.error.unwrap().contains("connection refused"));
}

// ============================================================
// Conditions
// ============================================================

#[tokio::test]
async fn false_condition_skips_without_dispatch() {
    let mock = Arc::new(MockCapability::returning("notify", json!("sent")));
    let mut registry = CapabilityRegistry::new();
    registry.register("notify-1", true, mock.clone());

    let mut guarded = step("send", "notify", json!({}));
    guarded.condition = Some("'{{mode}}' == 'loud'".into());

    let result = executor(registry)
        .execute(&workflow(vec![guarded]), inputs(&[("mode", json!("quiet"))]))
        .await;

    assert!(result.success);
    let skipped = &result.step_results[0];
    assert!(skipped.success);
    assert!(skipped.skipped);
    assert_eq!(skipped.output, None);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn condition_can_read_earlier_step_output() {
    let check = Arc::new(MockCapability::returning("check", json!({ "changed": true })));
    let notify = Arc::new(MockCapability::returning("notify", json!("sent")));
    let mut registry = CapabilityRegistry::new();
    registry.register("check-1", true, check);
    registry.register("notify-1", true, notify.clone());

    let mut send = step("send", "notify", json!({}));
    send.condition = Some("{{check.data.changed}} === true".into());

    let result = executor(registry)
        .execute(&workflow(vec![step("check", "check", json!({})), send]), Map::new())
        .await;

    assert!(result.success);
    assert_eq!(notify.call_count(), 1);
}

#[tokio::test]
async fn malformed_condition_follows_policy() {
    let build = |policy| {
        let mock = Arc::new(MockCapability::returning("t", json!(1)));
        let mut registry = CapabilityRegistry::new();
        registry.register("t-1", true, mock.clone());
        let exec = SkillExecutor::new(Arc::new(registry), ExecutorConfig { condition_failure: policy });
        (exec, mock)
    };
    let mut guarded = step("s", "t", json!({}));
    guarded.condition = Some("this is not valid".into());
    let wf = workflow(vec![guarded]);

    let (exec, mock) = build(ConditionFailurePolicy::Run);
    assert!(exec.execute(&wf, Map::new()).await.success);
    assert_eq!(mock.call_count(), 1);

    let (exec, mock) = build(ConditionFailurePolicy::Skip);
    let result = exec.execute(&wf, Map::new()).await;
    assert!(result.success && result.step_results[0].skipped);
    assert_eq!(mock.call_count(), 0);

    let (exec, mock) = build(ConditionFailurePolicy::Fail);
    let result = exec.execute(&wf, Map::new()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Step s failed: condition error"));
    assert_eq!(mock.call_count(), 0);
}

// ============================================================
// Events
// ============================================================

#[tokio::test]
async fn events_mirror_progress_and_terminate_once() {
    let mut registry = CapabilityRegistry::new();
    registry.register("ok-1", true, Arc::new(MockCapability::returning("ok", json!(1))));
    registry.register("bad-1", true, Arc::new(MockCapability::failing("bad", "nope")));

    let mut skipped = step("maybe", "ok", json!({}));
    skipped.condition = Some("false".into());
    let wf = workflow(vec![step("one", "ok", json!({})), skipped, step("two", "bad", json!({}))]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = executor(registry)
        .execute_with_notifier(&wf, Map::new(), &ChannelNotifier::new(tx))
        .await;
    assert!(!result.success);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            ExecutionEvent::StepStart { .. } => "step-start",
            ExecutionEvent::StepComplete { .. } => "step-complete",
            ExecutionEvent::StepError { .. } => "step-error",
            ExecutionEvent::ExecutionComplete { .. } => "execution-complete",
            ExecutionEvent::ExecutionError { .. } => "execution-error",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "step-start", "step-complete",
            "step-start", "step-complete",
            "step-start", "step-error",
            "execution-error",
        ]
    );
    assert!(matches!(events[3], ExecutionEvent::StepComplete { skipped: true, .. }));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match &events[6] {
        ExecutionEvent::ExecutionError { result: Some(r), .. } => assert_eq!(r, &result),
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test]
async fn successful_run_ends_with_execution_complete() {
    let mut registry = CapabilityRegistry::new();
    registry.register("ok-1", true, Arc::new(MockCapability::returning("ok", json!(1))));

    let (tx, mut rx) = mpsc::unbounded_channel();
    executor(registry)
        .execute_with_notifier(&workflow(vec![step("one", "ok", json!({}))]), Map::new(), &ChannelNotifier::new(tx))
        .await;

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(ExecutionEvent::ExecutionComplete { ref result }) if result.success));
}
