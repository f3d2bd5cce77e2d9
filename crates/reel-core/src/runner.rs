//! Background execution of tasks.
//!
//! One shared skeleton serves every [`JobKind`]: create the task directory,
//! build the kind's arguments, wait for a concurrency slot, mark the task
//! `processing`, run the downloader, locate the artifact, and finish with a
//! single terminal write. Every error inside that skeleton ends up in that
//! one `failed` write; nothing propagates to the caller and nothing retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::TaskError;
use crate::executor::Downloader;
use crate::kind::{JobKind, INFO_FILENAME};
use crate::store::TaskStore;
use crate::task::{JobParams, Task};

/// How many fresh ids to try before giving up on a colliding insert.
const MAX_ID_ATTEMPTS: usize = 3;

/// In-progress files yt-dlp may leave next to the real artifact.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

pub const RESTART_ERROR: &str = "interrupted by server restart";

pub struct TaskRunner<S> {
    store: Arc<S>,
    downloader: Downloader,
    downloads_dir: PathBuf,
    /// `None` means unbounded.
    permits: Option<Arc<Semaphore>>,
}

impl<S> std::fmt::Debug for TaskRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("downloader", &self.downloader)
            .field("downloads_dir", &self.downloads_dir)
            .field("available_permits", &self.permits.as_ref().map(|s| s.available_permits()))
            .finish()
    }
}

impl<S: TaskStore> TaskRunner<S> {
    pub fn new(store: Arc<S>, downloader: Downloader, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            downloader,
            downloads_dir: downloads_dir.into(),
            permits: None,
        }
    }

    /// Cap the number of simultaneously running subprocesses; `0` lifts the cap.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.downloads_dir.join(task_id)
    }

    /// Persist a new `waiting` task and start it in the background.
    ///
    /// Returns as soon as the record is stored; the subprocess runs later.
    pub async fn submit(
        self: &Arc<Self>,
        kind: JobKind,
        url: String,
        params: JobParams,
    ) -> Result<Task, TaskError> {
        let mut attempt = 1;
        loop {
            let task = Task::new(kind, url.clone(), params.clone());
            match self.store.insert_task(&task).await {
                Ok(()) => {
                    info!(task_id = %task.task_id, task_type = %kind, url = %task.url, "task created");
                    self.spawn(task.clone());
                    return Ok(task);
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() && attempt < MAX_ID_ATTEMPTS => {
                    warn!(task_id = %task.task_id, attempt, "task id collision; regenerating");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fire-and-forget: run `task` on the tokio runtime.
    pub fn spawn(self: &Arc<Self>, task: Task) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.run(task).await })
    }

    /// Drive `task` to a terminal state. Never returns an error: failures
    /// are recorded on the task itself.
    pub async fn run(&self, mut task: Task) {
        let task_id = task.task_id.clone();

        let terminal = match self.execute(&mut task).await {
            Ok(file) => {
                info!(task_id = %task_id, file = %file, "task completed");
                task.mark_completed(file)
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "task failed");
                task.mark_failed(e.to_string())
            }
        };

        if let Err(e) = terminal {
            error!(task_id = %task_id, error = %e, "refusing terminal write");
            return;
        }
        if let Err(e) = self.store.upsert_task(&task).await {
            error!(task_id = %task_id, error = %e, "failed to persist terminal task state");
        }
    }

    async fn execute(&self, task: &mut Task) -> Result<String, TaskError> {
        let dir = self.task_dir(&task.task_id);
        tokio::fs::create_dir_all(&dir).await?;

        let args = task.task_type.build_args(task);

        let _permit = self.acquire_slot().await?;
        task.mark_processing()?;
        self.store.upsert_task(task).await?;
        info!(task_id = %task.task_id, task_type = %task.task_type, "task processing");

        let output = self.downloader.run(&task.task_id, &dir, &args).await?;

        let filename = match task.task_type {
            JobKind::GetInfo => {
                tokio::fs::write(dir.join(INFO_FILENAME), output.stdout.as_bytes()).await?;
                INFO_FILENAME.to_owned()
            }
            kind => discover_output(&dir, kind.output_prefix()).await?,
        };
        Ok(file_reference(&task.task_id, &filename))
    }

    async fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>, TaskError> {
        match &self.permits {
            Some(permits) => Arc::clone(permits)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| TaskError::QueueClosed),
            None => Ok(None),
        }
    }

    /// Fail every task a previous process left `waiting` or `processing`.
    /// Returns how many records were closed out.
    pub async fn recover_interrupted(&self) -> Result<usize, TaskError> {
        let stale = self.store.list_unfinished_tasks().await?;
        let count = stale.len();
        for mut task in stale {
            task.mark_failed(RESTART_ERROR)?;
            self.store.upsert_task(&task).await?;
            warn!(task_id = %task.task_id, "marked interrupted task as failed");
        }
        Ok(count)
    }
}

/// Public path under which an artifact is served.
pub fn file_reference(task_id: &str, filename: &str) -> String {
    format!("/files/{task_id}/{filename}")
}

/// Find the artifact whose name starts with `prefix` in `dir`.
///
/// Partial downloads are skipped. With several candidates the
/// lexicographically first one wins; with none the task fails.
pub async fn discover_output(dir: &Path, prefix: &str) -> Result<String, TaskError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with(prefix) || PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            matches.push(name);
        }
    }

    matches.sort();
    if matches.len() > 1 {
        warn!(dir = %dir.display(), candidates = ?matches, "multiple output files; using the first");
    }
    matches.into_iter().next().ok_or_else(|| TaskError::NoOutput {
        prefix: prefix.to_owned(),
        dir: dir.display().to_string(),
    })
}

#[cfg(all(test, unix))]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::executor::test::fake_tool;
    use crate::store::SqliteStore;
    use crate::task::TaskStatus;

    struct Fixture {
        runner: Arc<TaskRunner<SqliteStore>>,
        _bin: tempfile::TempDir,
        downloads: tempfile::TempDir,
    }

    async fn fixture(script: &str, limit: usize) -> Fixture {
        let bin = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let runner = TaskRunner::new(store, fake_tool(bin.path(), script), downloads.path())
            .with_concurrency_limit(limit);
        Fixture {
            runner: Arc::new(runner),
            _bin: bin,
            downloads,
        }
    }

    async fn wait_terminal(runner: &TaskRunner<SqliteStore>, task_id: &str) -> Task {
        for _ in 0..200 {
            let task = runner.store().get_task(task_id).await.unwrap().unwrap();
            if task.status().is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {task_id} never finished");
    }

    /// Writes a file named after the `-o` template, the way yt-dlp does.
    const WRITE_OUTPUT: &str = r#"
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
name=$(echo "$out" | sed 's/%(ext)s/mp3/')
echo data > "$name"
"#;

    #[tokio::test]
    async fn audio_task_completes_with_file_reference() {
        let fx = fixture(WRITE_OUTPUT, 0).await;
        let task = fx
            .runner
            .submit(JobKind::GetAudio, "https://example.com/a".into(), JobParams::default())
            .await
            .unwrap();
        assert_eq!(task.status(), TaskStatus::Waiting);

        let done = wait_terminal(&fx.runner, &task.task_id).await;
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.file(), Some(format!("/files/{}/audio.mp3", task.task_id).as_str()));
        assert!(done.error().is_none());
        assert!(done.completed_time().is_some());
        assert!(fx.downloads.path().join(&task.task_id).join("audio.mp3").exists());
    }

    #[tokio::test]
    async fn nonzero_exit_fails_task() {
        let fx = fixture("echo 'ERROR: unsupported' >&2; exit 1", 0).await;
        let task = fx
            .runner
            .submit(JobKind::GetVideo, "https://example.com/v".into(), JobParams::default())
            .await
            .unwrap();

        let done = wait_terminal(&fx.runner, &task.task_id).await;
        assert_eq!(done.status(), TaskStatus::Failed);
        let error = done.error().unwrap();
        assert!(error.contains("code 1"), "{error}");
        assert!(error.contains("ERROR: unsupported"), "{error}");
        assert!(done.file().is_none());
        assert!(done.completed_time().is_some());
    }

    #[tokio::test]
    async fn missing_output_fails_task() {
        let fx = fixture("exit 0", 0).await;
        let task = fx
            .runner
            .submit(JobKind::GetLiveVideo, "https://example.com/live".into(), JobParams::default())
            .await
            .unwrap();

        let done = wait_terminal(&fx.runner, &task.task_id).await;
        assert_eq!(done.status(), TaskStatus::Failed);
        assert!(done.error().unwrap().contains("live_video."));
    }

    #[tokio::test]
    async fn info_task_persists_stdout() {
        let fx = fixture(r#"echo '{"title":"x","duration":10}'"#, 0).await;
        let task = fx
            .runner
            .submit(JobKind::GetInfo, "https://example.com/i".into(), JobParams::default())
            .await
            .unwrap();

        let done = wait_terminal(&fx.runner, &task.task_id).await;
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.file(), Some(format!("/files/{}/info.json", task.task_id).as_str()));

        let written = std::fs::read_to_string(fx.downloads.path().join(&task.task_id).join(INFO_FILENAME)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(doc["title"], "x");
    }

    #[tokio::test]
    async fn submit_returns_before_subprocess_finishes() {
        let fx = fixture("sleep 1; exit 0", 0).await;
        let task = fx
            .runner
            .submit(JobKind::GetInfo, "https://example.com/slow".into(), JobParams::default())
            .await
            .unwrap();

        let polled = fx.runner.store().get_task(&task.task_id).await.unwrap().unwrap();
        assert!(matches!(polled.status(), TaskStatus::Waiting | TaskStatus::Processing));
    }

    #[tokio::test]
    async fn concurrency_limit_keeps_extra_tasks_waiting() {
        let fx = fixture("sleep 1; echo '{}'", 1).await;
        let first = fx
            .runner
            .submit(JobKind::GetInfo, "https://example.com/1".into(), JobParams::default())
            .await
            .unwrap();
        let second = fx
            .runner
            .submit(JobKind::GetInfo, "https://example.com/2".into(), JobParams::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let a = fx.runner.store().get_task(&first.task_id).await.unwrap().unwrap();
        let b = fx.runner.store().get_task(&second.task_id).await.unwrap().unwrap();
        let processing = [a.status(), b.status()]
            .iter()
            .filter(|s| **s == TaskStatus::Processing)
            .count();
        assert_eq!(processing, 1);

        assert_eq!(wait_terminal(&fx.runner, &first.task_id).await.status(), TaskStatus::Completed);
        assert_eq!(wait_terminal(&fx.runner, &second.task_id).await.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn recovery_fails_unfinished_tasks() {
        let fx = fixture("exit 0", 0).await;
        let store = fx.runner.store();
        let waiting = Task::new(JobKind::GetAudio, "a", JobParams::default());
        let mut processing = Task::new(JobKind::GetVideo, "b", JobParams::default());
        processing.mark_processing().unwrap();
        store.upsert_task(&waiting).await.unwrap();
        store.upsert_task(&processing).await.unwrap();

        assert_eq!(fx.runner.recover_interrupted().await.unwrap(), 2);
        for id in [&waiting.task_id, &processing.task_id] {
            let t = store.get_task(id).await.unwrap().unwrap();
            assert_eq!(t.status(), TaskStatus::Failed);
            assert_eq!(t.error(), Some(RESTART_ERROR));
            assert!(t.completed_time().is_some());
        }
        assert_eq!(fx.runner.recover_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn discovery_prefers_first_complete_match() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["video.webm.part", "video.webm", "video.mkv", "live_video.mp4", "audio.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(discover_output(dir.path(), "video.").await.unwrap(), "video.mkv");
        assert_eq!(discover_output(dir.path(), "live_video.").await.unwrap(), "live_video.mp4");
    }

    #[tokio::test]
    async fn discovery_ignores_partial_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("audio.m4a.part"), b"x").unwrap();
        assert!(matches!(
            discover_output(dir.path(), "audio.").await,
            Err(TaskError::NoOutput { .. })
        ));
    }
}
