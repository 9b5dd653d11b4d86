// src/engine/hooks.rs

//! Extension points of a workflow.
//!
//! Instead of subclassing a workflow, callers plug behaviour in:
//! - [`Setup`] runs once inside `Workflow::start`, after the workspace is
//!   built and before any task is submitted.
//! - [`ExitIteration`] is consulted by an iterative workflow after every
//!   task it runs, and decides whether to stop producing new tasks.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::engine::workflow::Workflow;
use crate::errors::Result;
use crate::results::WorkflowResults;

pub trait Setup: Send {
    fn setup(&mut self, workflow: &mut Workflow) -> Result<()>;
}

/// Setup hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSetup;

impl Setup for NoopSetup {
    fn setup(&mut self, _workflow: &mut Workflow) -> Result<()> {
        Ok(())
    }
}

/// What an [`ExitIteration`] hook reports after looking at the workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationVerdict {
    /// Stop generating new tasks.
    pub exit: bool,
    /// Free-form data merged into the final results.
    pub data: BTreeMap<String, Value>,
}

impl IterationVerdict {
    pub fn keep_going() -> Self {
        Self::default()
    }

    pub fn stop() -> Self {
        Self {
            exit: true,
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data = data;
        self
    }
}

pub trait ExitIteration: Send {
    fn exit_iteration(&mut self, workflow: &Workflow) -> Result<IterationVerdict>;

    /// Enrich the aggregated results once the iteration is over.
    fn decorate_results(&self, _workflow: &Workflow, _results: &mut WorkflowResults) -> Result<()> {
        Ok(())
    }
}

/// Never exits: the iteration runs until the generator is exhausted or the
/// iteration budget is spent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExit;

impl ExitIteration for NeverExit {
    fn exit_iteration(&mut self, _workflow: &Workflow) -> Result<IterationVerdict> {
        Ok(IterationVerdict::keep_going())
    }
}
