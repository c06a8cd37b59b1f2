use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AppState;
use crate::error::ApiError;
use engine::{ExecutionResult, WorkflowDefinition};

/// Body of a manual run. Omitted inputs fall back to the workflow defaults.
#[derive(Debug, Default, Deserialize)]
pub struct RunWorkflowDto {
    #[serde(default)]
    pub inputs: Option<Map<String, Value>>,
}

/// Catalog entry with the schedule state folded in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    #[serde(flatten)]
    pub workflow: WorkflowDefinition,
    pub scheduled: bool,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    let scheduler = state.service.scheduler();
    let summaries = state
        .service
        .workflows()
        .iter()
        .map(|w| WorkflowSummary {
            scheduled: scheduler.is_scheduled(&w.id),
            workflow: (**w).clone(),
        })
        .collect();
    Json(summaries)
}

pub async fn run(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Option<Json<RunWorkflowDto>>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let inputs = payload.and_then(|Json(body)| body.inputs);
    let result = state.service.run_now(&id, inputs).await?;
    Ok(Json(result))
}
