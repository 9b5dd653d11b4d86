// src/exec/backend.rs

//! The contract the workflow expects from a task.
//!
//! The workflow never looks inside a task beyond these two traits:
//!
//! - [`Runnable`] is the narrow process-like capability (`start`, `poll`,
//!   `wait`, `communicate`), modelled on a child process handle. The workflow
//!   forwards it to every task it owns.
//! - [`Task`] adds identity, status and the dependency/output metadata the
//!   scheduler needs.
//!
//! Production code uses [`crate::exec::ProcessTask`]; tests provide their own
//! implementation that doesn't spawn real processes.

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::dag::{Link, TaskId, TaskStatus, normalize_ext};
use crate::errors::Result;
use crate::exec::manager::TaskManager;
use crate::job::JobSpec;
use crate::results::TaskResults;

/// Boxed future returned by the async parts of the task contract.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Process-like interface of a unit of work.
pub trait Runnable: Send {
    /// Launch the underlying process. Does not wait for it.
    fn start(&mut self) -> Result<()>;

    /// Non-blocking check: `Some(code)` once the process has exited.
    fn poll(&mut self) -> Result<Option<i32>>;

    /// Wait for the process to exit and return its exit code.
    fn wait(&mut self) -> BoxFuture<'_, Result<i32>>;

    /// Send `input` to stdin, wait for exit and return `(stdout, stderr)`.
    fn communicate(&mut self, input: Option<String>) -> BoxFuture<'_, Result<(String, String)>>;

    /// Exit code, `None` while the process hasn't terminated (or never ran).
    fn returncode(&self) -> Option<i32>;
}

/// A unit of work owned by a workflow.
pub trait Task: Runnable + Debug {
    fn id(&self) -> TaskId;

    fn name(&self) -> &str;

    /// Private working directory (`<workflow>/task_<id>`).
    fn workdir(&self) -> &Path;

    /// The job specification this task was built from.
    fn spec(&self) -> &JobSpec;

    /// The task's own copy of the resource-manager configuration.
    fn manager(&self) -> &TaskManager;

    /// Upstream dependencies, as registered.
    fn links(&self) -> &[Link];

    fn status(&self) -> TaskStatus;

    fn set_status(&mut self, status: TaskStatus);

    /// CPUs this task holds while submitted or running.
    fn total_cpus(&self) -> u32;

    /// Extensions of the files this task promises to produce.
    fn produces(&self) -> &[String];

    /// Refresh `status` from the underlying process.
    fn check_status(&mut self) -> Result<()>;

    /// Create the task directory and its input files. Idempotent.
    fn build_workspace(&mut self) -> Result<()>;

    fn outdata_dir(&self) -> PathBuf {
        self.workdir().join("outdata")
    }

    fn indata_dir(&self) -> PathBuf {
        self.workdir().join("indata")
    }

    fn tmpdata_dir(&self) -> PathBuf {
        self.workdir().join("tmpdata")
    }

    /// Path of the output file tagged `ext`, or `None` if this task never
    /// promised such a file.
    fn output_path_for_extension(&self, ext: &str) -> Option<PathBuf> {
        let ext = normalize_ext(ext);
        self.produces()
            .iter()
            .any(|p| normalize_ext(p) == ext)
            .then(|| self.outdata_dir().join(format!("out_{ext}")))
    }

    fn results(&self) -> TaskResults {
        TaskResults::new(self.id(), self.name(), self.status(), self.returncode())
    }
}
