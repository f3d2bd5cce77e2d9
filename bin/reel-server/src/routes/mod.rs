//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Per-request trace-id middleware around everything
//! - Health route and the optional OpenAPI document (public)
//! - Artifact download (public)
//! - Job submission and task status behind the `x-api-key` check

pub mod doc;
mod files;
mod health;
mod jobs;
mod tasks;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::middleware::{auth, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(jobs::router())
        .merge(tasks::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let mut app = Router::new()
        .merge(health::router())
        .merge(files::router())
        .merge(protected);

    if state.config.enable_openapi {
        app = app.merge(doc::router());
    }

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        trace::trace_middleware,
    ))
    .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use reel_core::{Downloader, SqliteStore, TaskRunner};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    const KEY: &str = "secret";

    /// Stand-in for yt-dlp: prints metadata for `--dump-json`, otherwise
    /// writes `<prefix>mp3` from the `-o` template.
    const FAKE_YTDLP: &str = r#"
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    printf '%s' '{"title":"x","duration":10,"formats":[{"format_id":"a","vcodec":"h264","height":720},{"format_id":"b","vcodec":"none","acodec":"aac","abr":128}]}'
    exit 0
  fi
done
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
name=$(echo "$out" | sed 's/%(ext)s/mp3/')
printf 'audio-bytes' > "$name"
"#;

    struct Harness {
        app: Router,
        _dirs: (tempfile::TempDir, tempfile::TempDir),
    }

    async fn harness(script: &str, api_key: Option<&str>) -> Harness {
        let bin = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let downloader = fake_tool(bin.path(), script);

        let config = Config {
            downloads_dir: downloads.path().to_path_buf(),
            api_key: api_key.map(str::to_owned),
            ..Config::default()
        };
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let runner = TaskRunner::new(Arc::clone(&store), downloader, downloads.path());

        let state = Arc::new(AppState {
            config: Arc::new(config),
            store,
            runner: Arc::new(runner),
        });
        Harness {
            app: build(state),
            _dirs: (bin, downloads),
        }
    }

    fn fake_tool(dir: &Path, body: &str) -> Downloader {
        let path = dir.join("fake-yt-dlp.sh");
        std::fs::write(&path, format!("{body}\n")).unwrap();
        Downloader::new("/bin/sh").with_base_args(vec![path.display().to_string()])
    }

    fn post_json(uri: &str, key: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            req = req.header(auth::API_KEY_HEADER, key);
        }
        req.body(Body::from(body.to_owned())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn status(task_id: &str) -> Request<Body> {
        Request::get(format!("/status/{task_id}"))
            .header(auth::API_KEY_HEADER, KEY)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_terminal(app: &Router, task_id: &str) -> Value {
        for _ in 0..200 {
            let res = app.clone().oneshot(status(task_id)).await.unwrap();
            let body = body_json(res).await;
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {task_id} never finished");
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness("exit 0", None).await;
        let res = h.app.oneshot(get("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(trace::X_TRACE_ID));
        assert_eq!(body_json(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn wrong_or_missing_key_is_401() {
        let h = harness("exit 0", Some(KEY)).await;
        for key in [None, Some("nope")] {
            let res = h
                .app
                .clone()
                .oneshot(post_json("/get_audio", key, r#"{"url":"U"}"#))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(res).await["error"], "Invalid or missing API key");
        }
    }

    #[tokio::test]
    async fn unconfigured_key_is_500() {
        let h = harness("exit 0", None).await;
        let res = h
            .app
            .oneshot(post_json("/get_info", Some(KEY), r#"{"url":"U"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["error"], "API_KEY not configured on server");
    }

    #[tokio::test]
    async fn missing_url_is_400_on_every_job_route() {
        let h = harness("exit 0", Some(KEY)).await;
        for uri in ["/get_video", "/get_audio", "/get_live_video", "/get_live_audio", "/get_info"] {
            let res = h.app.clone().oneshot(post_json(uri, Some(KEY), "{}")).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body_json(res).await["error"], "URL is required");
        }
        let res = h.app.oneshot(post_json("/get_info", Some(KEY), "not json")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_requires_key() {
        let h = harness("exit 0", Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_info", Some(KEY), r#"{"url":"https://example.com/private?token=abc"}"#))
            .await
            .unwrap();
        let task_id = body_json(res).await["task_id"].as_str().unwrap().to_owned();

        let res = h.app.clone().oneshot(get(&format!("/status/{task_id}"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(res).await;
        assert!(body.get("url").is_none());

        let res = h.app.oneshot(status(&task_id)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dash_prefixed_url_is_400() {
        let h = harness("exit 0", Some(KEY)).await;
        let res = h
            .app
            .oneshot(post_json("/get_info", Some(KEY), r#"{"url":"--exec=touch /tmp/x"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_task_and_file_are_404() {
        let h = harness("exit 0", Some(KEY)).await;
        let res = h.app.clone().oneshot(status("nope")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "Task not found");

        let res = h.app.oneshot(get("/files/nope/audio.mp3")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn audio_job_end_to_end() {
        let h = harness(FAKE_YTDLP, Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_audio", Some(KEY), r#"{"url":"U"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let accepted = body_json(res).await;
        assert_eq!(accepted["status"], "waiting");
        let task_id = accepted["task_id"].as_str().unwrap().to_owned();

        let done = wait_terminal(&h.app, &task_id).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["task_type"], "get_audio");
        assert_eq!(done["audio_format"], "best");
        assert_eq!(done["file"], format!("/files/{task_id}/audio.mp3"));
        assert!(done["error"].is_null());

        let res = h
            .app
            .oneshot(get(&format!("/files/{task_id}/audio.mp3?raw=true")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_owned();
        assert!(disposition.starts_with("attachment"));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"audio-bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn media_files_stream_inline_without_raw() {
        let h = harness(FAKE_YTDLP, Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_audio", Some(KEY), r#"{"url":"U"}"#))
            .await
            .unwrap();
        let task_id = body_json(res).await["task_id"].as_str().unwrap().to_owned();
        wait_terminal(&h.app, &task_id).await;

        let res = h
            .app
            .oneshot(get(&format!("/files/{task_id}/audio.mp3")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key(header::CONTENT_DISPOSITION));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"audio-bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn live_audio_job_finds_its_output() {
        let h = harness(FAKE_YTDLP, Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_live_audio", Some(KEY), r#"{"url":"U","duration":"0:30"}"#))
            .await
            .unwrap();
        let task_id = body_json(res).await["task_id"].as_str().unwrap().to_owned();

        let done = wait_terminal(&h.app, &task_id).await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["task_type"], "get_live_audio");
        assert_eq!(done["duration"], "0:30");
        assert_eq!(done["file"], format!("/files/{task_id}/live_audio.mp3"));

        let res = h
            .app
            .oneshot(get(&format!("/files/{task_id}/live_audio.mp3")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_marks_task_failed() {
        let h = harness("echo boom >&2\nexit 2", Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_video", Some(KEY), r#"{"url":"U","start_time":"1:30"}"#))
            .await
            .unwrap();
        let task_id = body_json(res).await["task_id"].as_str().unwrap().to_owned();

        let done = wait_terminal(&h.app, &task_id).await;
        assert_eq!(done["status"], "failed");
        assert!(done["error"].as_str().unwrap().contains("boom"));
        assert!(done["file"].is_null());
        assert!(done["completed_time"].is_string());
        assert_eq!(done["start_time"], "1:30");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn info_json_projections() {
        let h = harness(FAKE_YTDLP, Some(KEY)).await;
        let res = h
            .app
            .clone()
            .oneshot(post_json("/get_info", Some(KEY), r#"{"url":"U"}"#))
            .await
            .unwrap();
        let task_id = body_json(res).await["task_id"].as_str().unwrap().to_owned();
        let done = wait_terminal(&h.app, &task_id).await;
        assert_eq!(done["file"], format!("/files/{task_id}/info.json"));

        let uri = format!("/files/{task_id}/info.json?title=&duration=");
        let res = h.app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(body_json(res).await, json!({"title": "x", "duration": 10}));

        let uri = format!("/files/{task_id}/info.json?qualities");
        let q = body_json(h.app.clone().oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(q["qualities"]["video"]["a"]["height"], 720);
        assert_eq!(q["qualities"]["audio"]["b"]["abr"], 128);

        let uri = format!("/files/{task_id}/info.json?raw=true");
        let res = h.app.oneshot(get(&uri)).await.unwrap();
        assert!(res.headers().contains_key(header::CONTENT_DISPOSITION));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"{\"title\""));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let h = harness("exit 0", None).await;
        let res = h.app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let doc = body_json(res).await;
        assert!(doc["paths"]["/get_audio"].is_object());
    }
}
