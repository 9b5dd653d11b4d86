// src/engine/iterative.rs

//! A workflow that grows one task at a time.
//!
//! Each pass pulls a job from the generator, registers it, runs it to
//! completion and asks the exit hook whether to continue. At most one task
//! is in flight.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::engine::hooks::ExitIteration;
use crate::engine::workflow::Workflow;
use crate::errors::{FlowError, Result};
use crate::job::{JobGenerator, Next};
use crate::results::WorkflowResults;

/// Why the last call to [`IterativeWorkflow::submit_tasks`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStop {
    /// The exit hook asked to stop.
    Converged,
    /// The generator will never produce another job.
    Exhausted,
    /// The generator has nothing to offer right now; calling
    /// `submit_tasks` again resumes the iteration.
    Paused,
    /// `max_iter` tasks were run.
    MaxIterations,
}

pub struct IterativeWorkflow {
    workflow: Workflow,
    generator: Box<dyn JobGenerator>,
    exit: Box<dyn ExitIteration>,
    /// `0` means unbounded.
    max_iter: usize,
    data: BTreeMap<String, Value>,
    stop: Option<IterationStop>,
}

impl fmt::Debug for IterativeWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterativeWorkflow")
            .field("workflow", &self.workflow)
            .field("max_iter", &self.max_iter)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl IterativeWorkflow {
    pub fn new(
        workflow: Workflow,
        generator: Box<dyn JobGenerator>,
        exit: Box<dyn ExitIteration>,
        max_iter: usize,
    ) -> Self {
        Self {
            workflow,
            generator,
            exit,
            max_iter,
            data: BTreeMap::new(),
            stop: None,
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub fn into_workflow(self) -> Workflow {
        self.workflow
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Reason the iteration last stopped, `None` before the first pass.
    pub fn stop_reason(&self) -> Option<IterationStop> {
        self.stop
    }

    /// Data reported by the exit hook on its latest call.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Build the workspace, run the setup hook of the inner workflow, then
    /// iterate.
    pub async fn start(&mut self) -> Result<IterationStop> {
        self.workflow.start().await?;
        self.submit_tasks().await
    }

    /// Pull, register and run tasks until the hook exits, the generator
    /// stops producing or the iteration budget is spent.
    pub async fn submit_tasks(&mut self) -> Result<IterationStop> {
        // Tasks registered before the iteration (or restored) are run first.
        if !self.workflow.all_done() {
            self.workflow.submit_tasks().await?;
        }

        let stop = loop {
            let n = self.workflow.len() + 1;
            if self.max_iter > 0 && n > self.max_iter {
                info!(max_iter = self.max_iter, "iteration budget exhausted");
                break IterationStop::MaxIterations;
            }

            let spec = match self.generator.next_job() {
                Next::Job(spec) => spec,
                Next::Exhausted => {
                    info!(iterations = n - 1, "job generator exhausted");
                    break IterationStop::Exhausted;
                }
                Next::Paused => {
                    debug!(iterations = n - 1, "job generator paused");
                    break IterationStop::Paused;
                }
            };

            let link = self.workflow.register(spec, Vec::new())?;
            if self.workflow.len() != n {
                return Err(FlowError::Invariant(format!(
                    "expected {n} tasks after registering iteration {n}, found {}",
                    self.workflow.len()
                )));
            }

            let id = link.producer();
            let code = self.workflow.run_task(id).await?;
            let status = self.workflow.task(id)?.status();
            info!(iteration = n, task_id = id, ?code, %status, "iteration finished");

            let verdict = self.exit.exit_iteration(&self.workflow)?;
            self.data = verdict.data;
            if verdict.exit {
                info!(iteration = n, "exit condition reached");
                break IterationStop::Converged;
            }
        };

        self.stop = Some(stop);
        Ok(stop)
    }

    /// Results of the inner workflow, merged with the exit hook's data and
    /// decorated by the hook.
    pub fn get_results(&self) -> Result<WorkflowResults> {
        let mut results = self.workflow.get_results();
        results.update(self.data.clone());
        self.exit.decorate_results(&self.workflow, &mut results)?;
        Ok(results)
    }
}
