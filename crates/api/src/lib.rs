//! `api` crate — HTTP surface over [`WorkflowService`].
//!
//! Routes:
//!   GET    /api/health
//!   GET    /api/workflows
//!   POST   /api/workflows/:id/run
//!   POST   /api/workflows/:id/run/stream     (server-sent events)
//!   GET    /api/schedules
//!   GET    /api/schedules/:id
//!   GET    /api/history?workflowId=&limit=
//!   GET    /api/queue
//!   DELETE /api/queue/:task_id
//!   POST   /api/reload
//!   GET    /api/capabilities/health
//!   GET    /api/builtin-variables

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use scheduler::WorkflowService;

pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::system::health))
        .route("/api/workflows", get(handlers::workflows::list))
        .route("/api/workflows/:id/run", post(handlers::workflows::run))
        .route("/api/workflows/:id/run/stream", post(handlers::executions::run_stream))
        .route("/api/schedules", get(handlers::system::schedules))
        .route("/api/schedules/:id", get(handlers::system::schedule))
        .route("/api/history", get(handlers::executions::history))
        .route("/api/queue", get(handlers::executions::queue_status))
        .route("/api/queue/:task_id", delete(handlers::executions::cancel))
        .route("/api/reload", post(handlers::system::reload))
        .route("/api/capabilities/health", get(handlers::system::capability_health))
        .route("/api/builtin-variables", get(handlers::system::builtin_variables))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
