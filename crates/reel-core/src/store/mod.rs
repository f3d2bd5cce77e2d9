//! Task persistence.
//!
//! [`TaskStore`] is the seam between the runner / HTTP layer and the
//! database. The default implementation is [`sqlite::SqliteStore`]; another
//! backend only needs to implement this trait.
//!
//! Records are always written whole: a status change is a read-merge-write
//! by the caller followed by [`TaskStore::upsert_task`], never a column patch.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use crate::task::Task;

pub trait TaskStore: Send + Sync + 'static {
    /// Insert a brand-new record. Fails with a unique violation if the id exists.
    fn insert_task(&self, task: &Task) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Insert or fully replace the record keyed by `task.task_id`.
    fn upsert_task(&self, task: &Task) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_task(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<Task>, sqlx::Error>> + Send;

    /// Records still `waiting` or `processing`, oldest first.
    fn list_unfinished_tasks(&self) -> impl Future<Output = Result<Vec<Task>, sqlx::Error>> + Send;
}

pub use sqlite::SqliteStore;
