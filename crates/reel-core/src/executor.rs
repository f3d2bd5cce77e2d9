//! Runs the external download tool as a child process.
//!
//! stdout and stderr are drained concurrently while the child runs; every
//! chunk is forwarded to the log tagged with the task id and appended to the
//! captured output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ExecError;

const CHUNK_SIZE: usize = 8192;

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Handle to the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct Downloader {
    program: PathBuf,
    /// Passed before every job's own arguments (cookies, proxies, ...).
    base_args: Vec<String>,
}

impl Downloader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_base_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    /// Run the tool with `args` inside `work_dir`.
    ///
    /// Resolves with the collected output on exit code 0. A nonzero exit
    /// yields [`ExecError::Exit`] with the code and collected stderr; a launch
    /// failure yields [`ExecError::Spawn`] immediately.
    pub async fn run(
        &self,
        task_id: &str,
        work_dir: &Path,
        args: &[String],
    ) -> Result<ProcessOutput, ExecError> {
        debug!(task_id, program = %self.program.display(), ?args, "spawning downloader");

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;

        let (stdout, stderr, status) = tokio::join!(
            drain(task_id, Stream::Stdout, stdout),
            drain(task_id, Stream::Stderr, stderr),
            child.wait(),
        );
        let stdout = String::from_utf8_lossy(&stdout?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr?).into_owned();
        let status = status?;

        if status.success() {
            info!(task_id, "downloader finished");
            Ok(ProcessOutput { stdout, stderr })
        } else {
            warn!(task_id, code = ?status.code(), "downloader exited unsuccessfully");
            Err(ExecError::Exit { code: status.code(), stderr })
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(
    task_id: &str,
    stream: Stream,
    mut reader: R,
) -> std::io::Result<Vec<u8>> {
    let mut collected = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&chunk[..n]);
        let text = text.trim_end();
        if !text.is_empty() {
            match stream {
                Stream::Stdout => info!(task_id, "{text}"),
                Stream::Stderr => warn!(task_id, "{text}"),
            }
        }
        collected.extend_from_slice(&chunk[..n]);
    }
    Ok(collected)
}
