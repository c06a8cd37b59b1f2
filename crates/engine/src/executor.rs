//! Workflow execution engine.
//!
//! `SkillExecutor` is the central orchestrator for one run:
//! 1. Builds the `ExecutionContext` from the workflow's builtin toggles and
//!    the caller's inputs.
//! 2. Walks the steps in order; a step whose condition is false is recorded
//!    as a skipped success and never dispatched.
//! 3. Resolves each step's params template and dispatches it through the
//!    `CapabilityRegistry`.
//! 4. Stores the invoke envelope under the step id (and `outputVariable`) so
//!    later steps can reference it.
//! 5. Aborts on the first failing step (fail-fast); no later step dispatches.
//!
//! Apart from the capability call, execution does no I/O.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use capabilities::CapabilityRegistry;

use crate::condition::{evaluate_condition, ConditionFailurePolicy};
use crate::context::ExecutionContext;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::models::{ExecutionResult, Step, StepResult, WorkflowDefinition};
use crate::{template, EngineError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// What happens to a step whose condition cannot be evaluated.
    pub condition_failure: ConditionFailurePolicy,
}

// ---------------------------------------------------------------------------
// SkillExecutor
// ---------------------------------------------------------------------------

/// Runs one workflow to completion. Cheap to clone; shares the registry.
#[derive(Debug, Clone)]
pub struct SkillExecutor {
    registry: Arc<CapabilityRegistry>,
    config: ExecutorConfig,
}

/// What happened to a single step.
enum StepOutcome {
    Skipped,
    Completed { output: Value, raw_output: Option<String> },
    Failed { error: String, raw_output: Option<String> },
}

impl SkillExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Run the workflow without observing progress.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        inputs: Map<String, Value>,
    ) -> ExecutionResult {
        self.execute_with_notifier(workflow, inputs, &NoopNotifier).await
    }

    /// Run the workflow, reporting every step to `notifier`.
    ///
    /// Exactly one terminal event (`execution-complete` or `execution-error`)
    /// is emitted, after every step event.
    #[instrument(skip(self, inputs, notifier), fields(workflow_id = %workflow.id))]
    pub async fn execute_with_notifier(
        &self,
        workflow: &WorkflowDefinition,
        inputs: Map<String, Value>,
        notifier: &dyn ExecutionNotifier,
    ) -> ExecutionResult {
        let started = Instant::now();
        let total_steps = workflow.steps.len();
        let mut ctx = ExecutionContext::new(&workflow.builtin_variables, inputs);
        let mut step_results: Vec<StepResult> = Vec::with_capacity(total_steps);

        info!("executing workflow '{}' ({} steps)", workflow.id, total_steps);

        for (step_index, step) in workflow.steps.iter().enumerate() {
            let step_started = Instant::now();
            notifier.notify(ExecutionEvent::StepStart {
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                step_index,
                total_steps,
            });

            let outcome = self.run_step(step, &ctx).await;
            let duration_ms = elapsed_ms(step_started);

            match outcome {
                StepOutcome::Skipped => {
                    info!("skipping step '{}': condition not met", step.id);
                    notifier.notify(ExecutionEvent::StepComplete {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        step_index,
                        total_steps,
                        success: true,
                        skipped: true,
                        output: None,
                        raw_output: None,
                        duration_ms,
                    });
                    step_results.push(StepResult {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        success: true,
                        output: None,
                        raw_output: None,
                        error: None,
                        skipped: true,
                        duration_ms,
                    });
                }

                StepOutcome::Completed { output, raw_output } => {
                    info!("step '{}' succeeded in {}ms", step.id, duration_ms);
                    ctx.store_output(&step.id, step.output_variable.as_deref(), output.clone());
                    notifier.notify(ExecutionEvent::StepComplete {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        step_index,
                        total_steps,
                        success: true,
                        skipped: false,
                        output: Some(output.clone()),
                        raw_output: raw_output.clone(),
                        duration_ms,
                    });
                    step_results.push(StepResult {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        success: true,
                        output: Some(output),
                        raw_output,
                        error: None,
                        skipped: false,
                        duration_ms,
                    });
                }

                StepOutcome::Failed { error, raw_output } => {
                    error!("step '{}' failed: {}", step.id, error);
                    notifier.notify(ExecutionEvent::StepError {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        step_index,
                        total_steps,
                        error: error.clone(),
                        duration_ms,
                    });
                    step_results.push(StepResult {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        success: false,
                        output: None,
                        raw_output,
                        error: Some(error.clone()),
                        skipped: false,
                        duration_ms,
                    });

                    let message = EngineError::StepFailed {
                        step_id: step.id.clone(),
                        message: error,
                    }
                    .to_string();
                    let result = ExecutionResult {
                        success: false,
                        workflow_id: workflow.id.clone(),
                        step_results,
                        final_output: None,
                        error: Some(message.clone()),
                        duration_ms: elapsed_ms(started),
                    };
                    notifier.notify(ExecutionEvent::ExecutionError {
                        error: message,
                        result: Some(result.clone()),
                    });
                    return result;
                }
            }
        }

        let final_output = workflow.steps.last().and_then(|last| {
            let key = last.output_variable.as_deref().unwrap_or(&last.id);
            ctx.step_outputs.get(key).cloned()
        });

        let result = ExecutionResult {
            success: true,
            workflow_id: workflow.id.clone(),
            step_results,
            final_output,
            error: None,
            duration_ms: elapsed_ms(started),
        };
        info!("workflow '{}' succeeded in {}ms", workflow.id, result.duration_ms);
        notifier.notify(ExecutionEvent::ExecutionComplete { result: result.clone() });
        result
    }

    // -----------------------------------------------------------------------
    // Internal: condition, params, dispatch for a single step.
    // -----------------------------------------------------------------------

    async fn run_step(&self, step: &Step, ctx: &ExecutionContext) -> StepOutcome {
        match evaluate_condition(step.condition.as_deref(), ctx) {
            Ok(true) => {}
            Ok(false) => return StepOutcome::Skipped,
            Err(err) => {
                let condition = step.condition.as_deref().unwrap_or_default();
                match self.config.condition_failure {
                    ConditionFailurePolicy::Run => {
                        warn!("failed to evaluate condition '{}' of step '{}', running it: {}", condition, step.id, err);
                    }
                    ConditionFailurePolicy::Skip => {
                        warn!("failed to evaluate condition '{}' of step '{}', skipping it: {}", condition, step.id, err);
                        return StepOutcome::Skipped;
                    }
                    ConditionFailurePolicy::Fail => {
                        return StepOutcome::Failed {
                            error: EngineError::from(err).to_string(),
                            raw_output: None,
                        };
                    }
                }
            }
        }

        let params = template::resolve(&step.params, ctx);

        match self
            .registry
            .invoke(&step.capability_type, step.instance.as_deref(), &step.action, params)
            .await
        {
            Ok((instance, result)) => {
                info!("step '{}' dispatched '{}' to '{}'", step.id, step.action, instance);
                if result.success {
                    StepOutcome::Completed {
                        output: result.to_envelope(),
                        raw_output: result.raw_output,
                    }
                } else {
                    StepOutcome::Failed {
                        error: result.error.unwrap_or_else(|| "Unknown error".to_owned()),
                        raw_output: result.raw_output,
                    }
                }
            }
            Err(err) => StepOutcome::Failed {
                error: err.to_string(),
                raw_output: None,
            },
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
