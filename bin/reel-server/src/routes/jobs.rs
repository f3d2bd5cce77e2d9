//! Job submission endpoints.
//!
//! Each handler validates its body, stores a `waiting` task and returns
//! `{status, task_id}` right away; the download runs in the background.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use utoipa::OpenApi;
use validator::ValidationErrors;

use crate::error::ServerError;
use crate::schemas::job::{
    AudioJobRequest, InfoJobRequest, JobAccepted, JobRequest, LiveAudioJobRequest,
    LiveVideoJobRequest, VideoJobRequest,
};
use crate::schemas::ErrorResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_video, get_audio, get_live_video, get_live_audio, get_info),
    components(schemas(
        VideoJobRequest,
        AudioJobRequest,
        LiveVideoJobRequest,
        LiveAudioJobRequest,
        InfoJobRequest,
        JobAccepted,
        ErrorResponse,
    )),
)]
pub struct JobsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/get_video", post(get_video))
        .route("/get_audio", post(get_audio))
        .route("/get_live_video", post(get_live_video))
        .route("/get_live_audio", post(get_live_audio))
        .route("/get_info", post(get_info))
}

#[utoipa::path(
    post,
    path = "/get_video",
    tag = "jobs",
    request_body = VideoJobRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task accepted", body = JobAccepted),
        (status = 400, description = "Missing url or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse),
    )
)]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VideoJobRequest>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    submit(&state, body).await
}

#[utoipa::path(
    post,
    path = "/get_audio",
    tag = "jobs",
    request_body = AudioJobRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task accepted", body = JobAccepted),
        (status = 400, description = "Missing url or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse),
    )
)]
pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AudioJobRequest>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    submit(&state, body).await
}

#[utoipa::path(
    post,
    path = "/get_live_video",
    tag = "jobs",
    request_body = LiveVideoJobRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task accepted", body = JobAccepted),
        (status = 400, description = "Missing url or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse),
    )
)]
pub async fn get_live_video(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LiveVideoJobRequest>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    submit(&state, body).await
}

#[utoipa::path(
    post,
    path = "/get_live_audio",
    tag = "jobs",
    request_body = LiveAudioJobRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task accepted", body = JobAccepted),
        (status = 400, description = "Missing url or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse),
    )
)]
pub async fn get_live_audio(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LiveAudioJobRequest>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    submit(&state, body).await
}

#[utoipa::path(
    post,
    path = "/get_info",
    tag = "jobs",
    request_body = InfoJobRequest,
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Task accepted", body = JobAccepted),
        (status = 400, description = "Missing url or malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid or missing API key", body = ErrorResponse),
        (status = 500, description = "Server error", body = ErrorResponse),
    )
)]
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InfoJobRequest>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    submit(&state, body).await
}

async fn submit<R: JobRequest>(
    state: &AppState,
    body: Result<Json<R>, JsonRejection>,
) -> Result<Json<JobAccepted>, ServerError> {
    let Json(req) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| ServerError::BadRequest(first_message(&e)))?;

    let (url, params) = req.into_job();
    let task = state.runner.submit(R::KIND, url, params).await?;

    Ok(Json(JobAccepted {
        status: task.status(),
        task_id: task.task_id,
    }))
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}
