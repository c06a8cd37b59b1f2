use std::convert::Infallible;
use std::pin::Pin;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use super::workflows::RunWorkflowDto;
use super::AppState;
use crate::error::ApiError;
use queue::QueueStatus;
use scheduler::{ExecutionRecord, DEFAULT_HISTORY_LIMIT};

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Run a workflow and stream each [`engine::ExecutionEvent`] as one SSE
/// message whose data is the event's JSON. The stream ends after the
/// terminal event.
pub async fn run_stream(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Option<Json<RunWorkflowDto>>,
) -> Result<Sse<SseStream>, ApiError> {
    let inputs = payload.and_then(|Json(body)| body.inputs);
    let events = state.service.run_now_streaming(&id, inputs)?;

    let stream = UnboundedReceiverStream::new(events).map(|event| {
        let message = Event::default().json_data(&event).unwrap_or_else(|e| {
            warn!("failed to encode execution event: {}", e);
            Event::default().comment("unencodable event")
        });
        Ok::<_, Infallible>(message)
    });
    Ok(Sse::new(Box::pin(stream) as SseStream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub workflow_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ExecutionRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(state.service.history(query.workflow_id.as_deref(), limit))
}

pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.service.queue_status())
}

pub async fn cancel(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if state.service.cancel(&task_id) {
        Ok(Json(serde_json::json!({ "cancelled": task_id })))
    } else {
        Err(ApiError::NotFound(format!(
            "task '{task_id}' is not queued (it may be running or finished)"
        )))
    }
}
