//! SQLite implementation of [`TaskStore`].
//!
//! Migrations under `migrations/` are embedded at compile time by
//! `sqlx::migrate!` and applied by [`SqliteStore::connect`]; every statement
//! is `IF NOT EXISTS`, so reconnecting to an existing database is a no-op.
//!
//! Runtime-checked `sqlx::query` is used so no `DATABASE_URL` is needed at
//! compile time.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::TaskStore;
use crate::kind::JobKind;
use crate::task::{format_timestamp, Task, TaskStatus};

const COLUMNS: &str = "task_id, task_type, status, url, video_format, audio_format, output_format, \
     start_time, end_time, force_keyframes, duration, error, file, created_at, completed_time";

/// SQLite-backed task store. Cloning shares the underlying pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    task_type: String,
    status: String,
    url: String,
    video_format: Option<String>,
    audio_format: Option<String>,
    output_format: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    force_keyframes: i64,
    duration: Option<String>,
    error: Option<String>,
    file: Option<String>,
    created_at: String,
    completed_time: Option<String>,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL such as `"sqlite://data/tasks.db"`; the
    /// parent directory is created if missing. `"sqlite::memory:"` gives a
    /// private in-memory database held by a single pooled connection.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn write(&self, verb: &str, task: &Task) -> Result<(), sqlx::Error> {
        let sql = format!(
            "{verb} INTO tasks ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        );
        sqlx::query(&sql)
            .bind(&task.task_id)
            .bind(task.task_type.as_ref())
            .bind(task.status.as_ref())
            .bind(&task.url)
            .bind(&task.video_format)
            .bind(&task.audio_format)
            .bind(&task.output_format)
            .bind(&task.start_time)
            .bind(&task.end_time)
            .bind(i64::from(task.force_keyframes))
            .bind(&task.duration)
            .bind(&task.error)
            .bind(&task.file)
            .bind(format_timestamp(&task.created_at))
            .bind(task.completed_time.as_ref().map(format_timestamp))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl TaskStore for SqliteStore {
    async fn insert_task(&self, task: &Task) -> Result<(), sqlx::Error> {
        self.write("INSERT", task).await
    }

    async fn upsert_task(&self, task: &Task) -> Result<(), sqlx::Error> {
        self.write("INSERT OR REPLACE", task).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, sqlx::Error> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM tasks WHERE task_id = ?1"))
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<Task>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE status IN ('waiting', 'processing') \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let task_type = row.task_type.parse::<JobKind>().map_err(|_| {
            sqlx::Error::Decode(format!("unknown task_type '{}'", row.task_type).into())
        })?;
        let status = row.status.parse::<TaskStatus>().map_err(|_| {
            sqlx::Error::Decode(format!("unknown status '{}'", row.status).into())
        })?;

        Ok(Task {
            created_at: parse_timestamp("created_at", &row.created_at)?,
            completed_time: row
                .completed_time
                .as_deref()
                .map(|raw| parse_timestamp("completed_time", raw))
                .transpose()?,
            task_id: row.task_id,
            task_type,
            status,
            url: row.url,
            video_format: row.video_format,
            audio_format: row.audio_format,
            output_format: row.output_format,
            start_time: row.start_time,
            end_time: row.end_time,
            force_keyframes: row.force_keyframes != 0,
            duration: row.duration,
            error: row.error,
            file: row.file,
        })
    }
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse().map_err(|e: chrono::ParseError| {
        sqlx::Error::Decode(format!("invalid {column} '{raw}': {e}").into())
    })
}
