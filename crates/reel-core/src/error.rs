use std::io;

use thiserror::Error;

use crate::task::TaskStatus;

/// Failure of a single external-tool invocation.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The binary could not be started (not found, permission denied, ...).
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but exited unsuccessfully.
    #[error("yt-dlp exited with code {}: {stderr}", describe_code(.code))]
    Exit { code: Option<i32>, stderr: String },

    /// Reading the child's output or waiting on it failed.
    #[error("I/O error while collecting output: {0}")]
    Io(#[from] io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_owned(),
    }
}

/// Everything that can end a task in `failed`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The tool exited cleanly but left no file with the expected prefix.
    #[error("no output file matching '{prefix}*' found in {dir}")]
    NoOutput { prefix: String, dir: String },

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("job queue is closed")]
    QueueClosed,
}

/// Errors from the artifact access layer.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid metadata document: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
