//! The task record and its state machine.
//!
//! A task moves `waiting -> processing -> {completed | failed}`. A task may
//! also go straight from `waiting` to `failed` when it dies before its
//! subprocess starts (working directory errors, or recovery after a restart).
//! Exactly one terminal write happens per task; `file` and `error` are never
//! both set.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::TaskError;
use crate::kind::JobKind;

/// Lifecycle state of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward move.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Waiting, Processing) | (Waiting, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

/// Optional, kind-specific job parameters. `None` means "use the kind default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobParams {
    pub video_format: Option<String>,
    pub audio_format: Option<String>,
    pub output_format: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub force_keyframes: bool,
    pub duration: Option<String>,
}

/// A durable task record, serialized as-is by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Task {
    pub task_id: String,
    pub task_type: JobKind,
    pub(crate) status: TaskStatus,
    pub url: String,
    pub video_format: Option<String>,
    pub audio_format: Option<String>,
    pub output_format: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub force_keyframes: bool,
    pub duration: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) file: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_optional_timestamp")]
    #[schema(value_type = Option<String>)]
    pub(crate) completed_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a fresh `waiting` task with a new id, applying the kind's defaults.
    pub fn new(kind: JobKind, url: impl Into<String>, mut params: JobParams) -> Self {
        kind.apply_defaults(&mut params);
        Self {
            task_id: new_task_id(),
            task_type: kind,
            status: TaskStatus::Waiting,
            url: url.into(),
            video_format: params.video_format,
            audio_format: params.audio_format,
            output_format: params.output_format,
            start_time: params.start_time,
            end_time: params.end_time,
            force_keyframes: params.force_keyframes,
            duration: params.duration,
            error: None,
            file: None,
            created_at: now(),
            completed_time: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn completed_time(&self) -> Option<DateTime<Utc>> {
        self.completed_time
    }

    pub fn mark_processing(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Processing)
    }

    /// Terminal success; records the externally visible file reference.
    pub fn mark_completed(&mut self, file: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Completed)?;
        self.file = Some(file.into());
        self.error = None;
        self.completed_time = Some(now());
        Ok(())
    }

    /// Terminal failure; records a human-readable reason.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.file = None;
        self.completed_time = Some(now());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// 16 lowercase hex characters taken from a random v4 UUID.
pub fn new_task_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Current time truncated to millisecond precision, matching what the store keeps.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(ts))
}

fn serialize_optional_timestamp<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => s.serialize_str(&format_timestamp(ts)),
        None => s.serialize_none(),
    }
}
