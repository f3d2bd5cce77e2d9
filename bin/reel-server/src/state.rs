//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use reel_core::{SqliteStore, TaskRunner};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Durable task records.
    pub store: Arc<SqliteStore>,
    /// Starts and drives background download tasks.
    pub runner: Arc<TaskRunner<SqliteStore>>,
}
