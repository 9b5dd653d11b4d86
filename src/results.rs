// src/results.rs

//! Result aggregation for workflows.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::{TaskId, TaskStatus};
use crate::errors::Result;
use crate::fs::FileSystem;

/// Summary of one task once the workflow is done with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub returncode: Option<i32>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl TaskResults {
    pub fn new(task_id: TaskId, name: &str, status: TaskStatus, returncode: Option<i32>) -> Self {
        Self {
            task_id,
            name: name.to_string(),
            status,
            returncode,
            messages: Vec::new(),
        }
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Problems with this task's outcome; empty when it completed cleanly.
    pub fn assert_valid(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.status.is_ok() {
            problems.push(format!(
                "task {} ({}) finished with status {}",
                self.task_id, self.name, self.status
            ));
        }
        problems.extend(
            self.messages
                .iter()
                .map(|m| format!("task {} ({}): {m}", self.task_id, self.name)),
        );
        problems
    }
}

/// Per-task results, free-form data merged in by the workflow, and a
/// deduplicated list of non-fatal exception messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResults {
    pub task_results: BTreeMap<String, TaskResults>,
    #[serde(default, flatten)]
    pub data: BTreeMap<String, Value>,
    #[serde(default, rename = "_exceptions")]
    exceptions: Vec<String>,
}

impl WorkflowResults {
    pub fn new(task_results: impl IntoIterator<Item = TaskResults>) -> Self {
        Self {
            task_results: task_results
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            ..Self::default()
        }
    }

    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    /// Record an exception message; a message already present is ignored.
    pub fn push_exception(&mut self, exc: impl ToString) {
        let msg = exc.to_string();
        if !self.exceptions.contains(&msg) {
            self.exceptions.push(msg);
        }
    }

    pub fn push_exceptions<I, E>(&mut self, excs: I)
    where
        I: IntoIterator<Item = E>,
        E: ToString,
    {
        for exc in excs {
            self.push_exception(exc);
        }
    }

    /// Merge `data` into the free-form results, overwriting existing keys.
    pub fn update(&mut self, data: impl IntoIterator<Item = (String, Value)>) {
        self.data.extend(data);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Collect the validation problems of every task into the exception list
    /// and return the full list. Empty means the results look valid.
    pub fn assert_valid(&mut self) -> &[String] {
        let problems: Vec<String> = self
            .task_results
            .values()
            .flat_map(TaskResults::assert_valid)
            .collect();
        self.push_exceptions(problems);
        &self.exceptions
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn json_dump(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        fs.write(path, self.to_json()?.as_bytes())?;
        Ok(())
    }
}
