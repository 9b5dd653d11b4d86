// src/engine/snapshot.rs

//! Saving and restoring a workflow.
//!
//! The snapshot stores what the scheduler needs to take the same decisions
//! again: every task's job spec, manager, status and links, plus the
//! workflow-level defaults. Processes are not persisted; a task restored as
//! `Running` stays `Running` until something else updates it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dag::{Link, TaskId, TaskStatus};
use crate::engine::workflow::{SubmitPolicy, TaskOptions, Workflow};
use crate::errors::{FlowError, Result};
use crate::exec::{TaskManager, TaskRegistry};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobSpec;

/// File name of the snapshot inside the workflow directory.
pub const SNAPSHOT_FNAME: &str = "__workflow__.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub spec: JobSpec,
    pub manager: TaskManager,
    pub status: TaskStatus,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub returncode: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workdir: PathBuf,
    pub manager: TaskManager,
    #[serde(default)]
    pub policy: SubmitPolicy,
    pub tasks: Vec<TaskSnapshot>,
}

impl WorkflowSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Workflow {
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workdir: self.workdir().to_path_buf(),
            manager: self.manager().clone(),
            policy: self.policy(),
            tasks: self
                .tasks()
                .map(|task| TaskSnapshot {
                    id: task.id(),
                    name: task.name().to_string(),
                    spec: task.spec().clone(),
                    manager: task.manager().clone(),
                    status: task.status(),
                    links: self.links_of(task.id()).to_vec(),
                    returncode: task.returncode(),
                })
                .collect(),
        }
    }

    /// Write the snapshot to `<workdir>/__workflow__.json` and return its path.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.path_in_workdir(SNAPSHOT_FNAME);
        self.fs().write(&path, self.snapshot().to_json()?.as_bytes())?;
        info!(path = %path.display(), num_tasks = self.len(), "workflow saved");
        Ok(path)
    }

    /// Restore a workflow saved with [`Workflow::save`].
    ///
    /// `path` is either the snapshot file or the workflow directory holding
    /// it. Tasks are rebuilt through `registry`, so it must know every
    /// strategy kind used by the saved workflow.
    pub fn restore(path: impl AsRef<Path>, registry: TaskRegistry) -> Result<Workflow> {
        Self::restore_with(Arc::new(RealFileSystem), path, registry)
    }

    pub fn restore_with(
        fs: Arc<dyn FileSystem>,
        path: impl AsRef<Path>,
        registry: TaskRegistry,
    ) -> Result<Workflow> {
        let path = path.as_ref();
        let file = if fs.is_dir(path) {
            path.join(SNAPSHOT_FNAME)
        } else {
            path.to_path_buf()
        };
        let snapshot = WorkflowSnapshot::from_json(&fs.read_to_string(&file)?)?;
        let workflow = Self::from_snapshot(snapshot, fs, registry)?;
        info!(path = %file.display(), num_tasks = workflow.len(), "workflow restored");
        Ok(workflow)
    }

    pub fn from_snapshot(
        snapshot: WorkflowSnapshot,
        fs: Arc<dyn FileSystem>,
        registry: TaskRegistry,
    ) -> Result<Workflow> {
        let mut workflow = Workflow::new(snapshot.workdir)
            .with_fs(fs)
            .with_registry(registry)
            .with_manager(snapshot.manager)
            .with_policy(snapshot.policy);

        for (expected, task) in snapshot.tasks.into_iter().enumerate() {
            if task.id != expected {
                return Err(FlowError::Invariant(format!(
                    "snapshot lists task {} at position {expected}",
                    task.id
                )));
            }
            let options = TaskOptions::named(task.name).with_manager(task.manager);
            workflow.register_with(task.spec, task.links, options)?;
            workflow.task_mut(task.id)?.set_status(task.status);
        }
        Ok(workflow)
    }
}
