//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use queue::QueueError;
use scheduler::ServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::Service(ServiceError::WorkflowNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Service(ServiceError::Busy(QueueError::Busy { .. })) => StatusCode::CONFLICT,
            ApiError::Service(ServiceError::Source(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::Service(ServiceError::Busy(QueueError::Busy { task_id, workflow_name })) = &self {
            body["currentTask"] = serde_json::json!({ "id": task_id, "workflowName": workflow_name });
        }
        (status, Json(body)).into_response()
    }
}
