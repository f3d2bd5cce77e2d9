//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;

/// Runtime configuration for reel-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; only the API key has no default, and job endpoints answer
/// 500 until it is configured.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`, or `0.0.0.0:$PORT`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://data/tasks.db"`).
    pub database_url: String,

    /// Root directory holding one working directory per task.
    pub downloads_dir: PathBuf,

    /// Path or name of the yt-dlp binary.
    pub ytdlp_path: PathBuf,

    /// Extra arguments passed to every yt-dlp invocation, whitespace separated.
    pub ytdlp_extra_args: Vec<String>,

    /// Shared secret expected in the `x-api-key` header.
    pub api_key: Option<String>,

    /// Upper bound on concurrently running downloads; `0` means unbounded.
    pub max_concurrent_jobs: usize,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, write logs to a daily rolling file in this directory.
    pub log_dir: Option<PathBuf>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let bind_address = std::env::var("REEL_BIND").unwrap_or_else(|_| {
            let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_owned());
            format!("0.0.0.0:{port}")
        });

        Self {
            bind_address,
            database_url: env_or("REEL_DATABASE_URL", "sqlite://data/tasks.db"),
            downloads_dir: PathBuf::from(env_or("REEL_DOWNLOADS_DIR", "downloads")),
            ytdlp_path: PathBuf::from(env_or("REEL_YTDLP_PATH", "yt-dlp")),
            ytdlp_extra_args: split_args(&env_or("REEL_YTDLP_EXTRA_ARGS", "")),
            api_key: non_empty_env("REEL_API_KEY").or_else(|| non_empty_env("API_KEY")),
            max_concurrent_jobs: parse_env("REEL_MAX_CONCURRENT_JOBS", 4),
            log_level: env_or("REEL_LOG", "info"),
            log_json: env_flag("REEL_LOG_JSON", false),
            log_dir: non_empty_env("REEL_LOG_DIR").map(PathBuf::from),
            enable_openapi: env_flag("REEL_ENABLE_OPENAPI", true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_owned(),
            database_url: "sqlite://data/tasks.db".to_owned(),
            downloads_dir: PathBuf::from("downloads"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ytdlp_extra_args: Vec::new(),
            api_key: None,
            max_concurrent_jobs: 4,
            log_level: "info".to_owned(),
            log_json: false,
            log_dir: None,
            enable_openapi: true,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}
