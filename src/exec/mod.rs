// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] defines the `Runnable` / `Task` contract the workflow drives.
//! - [`process_task`] is the production task: a shell command run with
//!   `tokio::process::Command` inside the task directory.
//! - [`factory`] maps job specifications to tasks (strategy kind → factory).
//! - [`manager`] holds the per-task resource-manager configuration.
//! - [`reader`] extracts named scalars from task artifacts.

pub mod backend;
pub mod factory;
pub mod manager;
pub mod process_task;
pub mod reader;

pub use backend::{BoxFuture, Runnable, Task};
pub use factory::{ProcessTaskFactory, ShellStrategyFactory, TaskContext, TaskFactory, TaskRegistry};
pub use manager::TaskManager;
pub use process_task::ProcessTask;
pub use reader::{KeyValueReader, Scalar, ScalarReader};
