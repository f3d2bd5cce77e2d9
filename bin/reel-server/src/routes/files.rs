//! Artifact download.
//!
//! `info.json` is parsed and projected unless `raw` is set; every other file
//! is streamed from disk with range support.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use reel_core::artifact::{self, ArtifactQuery, InfoView};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::ErrorResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_file), components(schemas(ErrorResponse)))]
pub struct FilesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/files/{task_id}/{filename}", get(get_file))
}

#[utoipa::path(
    get,
    path = "/files/{task_id}/{filename}",
    tag = "files",
    params(
        ("task_id" = String, Path, description = "Task identifier"),
        ("filename" = String, Path, description = "Artifact name, e.g. `audio.mp3` or `info.json`"),
        ("raw" = Option<String>, Query, description = "Send the file untouched, as an attachment"),
        ("qualities" = Option<String>, Query, description = "Summarise `info.json` formats by quality"),
    ),
    responses(
        (status = 200, description = "File contents or projected metadata"),
        (status = 404, description = "File not found", body = ErrorResponse),
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path((task_id, filename)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    request: Request,
) -> Result<Response, ServerError> {
    let path = artifact::resolve_artifact(state.runner.downloads_dir(), &task_id, &filename).await?;
    let query = ArtifactQuery::from_pairs(pairs);

    if artifact::is_info_file(&filename) {
        if let InfoView::Json(doc) = artifact::render_info(&path, &query).await? {
            return Ok(Json(doc).into_response());
        }
    }

    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    };

    if query.raw {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}
