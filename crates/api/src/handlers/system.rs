use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use super::AppState;
use crate::error::ApiError;
use capabilities::InstanceHealth;
use engine::{builtin_variable_catalog, BuiltinVariableInfo};
use scheduler::ScheduleStatus;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let queue = state.service.queue_status();
    Json(serde_json::json!({
        "status": "ok",
        "workflows": state.service.workflows().len(),
        "scheduled": state.service.scheduler().scheduled_count(),
        "busy": queue.current_task.is_some(),
        "queued": queue.queued_tasks.len(),
    }))
}

pub async fn schedules(State(state): State<AppState>) -> Json<Vec<ScheduleStatus>> {
    Json(state.service.schedule_statuses())
}

pub async fn schedule(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ScheduleStatus>, ApiError> {
    state
        .service
        .schedule_status(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("workflow '{id}' has no schedule")))
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let scheduled = state.service.reload()?;
    info!("workflow catalog reloaded over http");
    Ok(Json(serde_json::json!({
        "workflows": state.service.workflows().len(),
        "scheduled": scheduled,
    })))
}

pub async fn capability_health(State(state): State<AppState>) -> Json<Vec<InstanceHealth>> {
    Json(state.service.capability_health().await)
}

pub async fn builtin_variables() -> Json<Vec<BuiltinVariableInfo>> {
    Json(builtin_variable_catalog())
}
