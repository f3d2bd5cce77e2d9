//! reel-core: the task lifecycle engine behind reel-server.
//!
//! - [`task`]: the durable task record and its state machine
//! - [`kind`]: the five job kinds and their yt-dlp arguments
//! - [`store`]: persistence trait and the SQLite implementation
//! - [`executor`]: subprocess invocation with streamed, logged output
//! - [`runner`]: background execution, output discovery, restart recovery
//! - [`artifact`]: file resolution and `info.json` projections

pub mod artifact;
pub mod error;
pub mod executor;
pub mod kind;
pub mod runner;
pub mod store;
pub mod task;
pub mod timespec;

pub use error::{ArtifactError, ExecError, TaskError};
pub use executor::{Downloader, ProcessOutput};
pub use kind::{JobKind, INFO_FILENAME};
pub use runner::TaskRunner;
pub use store::{SqliteStore, TaskStore};
pub use task::{JobParams, Task, TaskStatus};
pub use timespec::{parse_time, TimeValue};
