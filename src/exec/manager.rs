// src/exec/manager.rs

//! Resource-manager configuration attached to every task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a task's command is launched: shell, optional MPI launcher, CPU count
/// and extra environment.
///
/// This is a plain value. `Workflow::register` clones the workflow default
/// into each task, so changing the default later never affects tasks that
/// are already registered, and a task mutating its own copy never affects
/// its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManager {
    pub shell: String,
    pub mpi_runner: Option<String>,
    pub ncpus: u32,
    pub env: BTreeMap<String, String>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self {
            shell: default_shell().to_string(),
            mpi_runner: None,
            ncpus: 1,
            env: BTreeMap::new(),
        }
    }
}

fn default_shell() -> &'static str {
    if cfg!(windows) { "cmd" } else { "sh" }
}

impl TaskManager {
    pub fn with_ncpus(mut self, ncpus: u32) -> Self {
        self.ncpus = ncpus;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Flag that makes the shell run a command string.
    pub fn shell_flag(&self) -> &'static str {
        if self.shell.eq_ignore_ascii_case("cmd") {
            "/C"
        } else {
            "-c"
        }
    }

    /// The command line actually handed to the shell.
    ///
    /// The MPI launcher is only used for parallel runs.
    pub fn command_line(&self, command: &str, ncpus: u32) -> String {
        match &self.mpi_runner {
            Some(runner) if ncpus > 1 => format!("{runner} -n {ncpus} {command}"),
            _ => command.to_string(),
        }
    }
}
