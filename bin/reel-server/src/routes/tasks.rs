//! Task status lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use reel_core::{JobKind, Task, TaskStatus, TaskStore};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::ErrorResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_status),
    components(schemas(Task, TaskStatus, JobKind, ErrorResponse)),
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status/{task_id}", get(get_status))
}

/// Full task record, as last persisted by the runner.
#[utoipa::path(
    get,
    path = "/status/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Task identifier")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task record", body = Task),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 404, description = "Unknown task", body = ErrorResponse),
    )
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ServerError> {
    state
        .store
        .get_task(&task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Task not found".into()))
}
