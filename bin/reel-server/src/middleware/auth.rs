use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject job submissions that do not carry the configured shared secret.
///
/// A server started without a key answers 500 rather than letting requests
/// through unauthenticated.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return ServerError::Misconfigured("API_KEY not configured on server".into()).into_response();
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => next.run(req).await,
        _ => ServerError::Unauthorized("Invalid or missing API key".into()).into_response(),
    }
}
