// src/exec/factory.rs

//! Turning job specifications into tasks.
//!
//! Raw inputs always go to the generic factory. Strategies are dispatched on
//! their `kind`; a kind nobody registered is an `UnsupportedJobSpec` error.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::dag::{Link, TaskId};
use crate::errors::{FlowError, Result};
use crate::exec::backend::Task;
use crate::exec::manager::TaskManager;
use crate::exec::process_task::ProcessTask;
use crate::fs::FileSystem;
use crate::job::{JobInput, JobSpec, Strategy};

/// Everything a factory needs besides the job spec itself.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub name: String,
    pub workdir: PathBuf,
    pub manager: TaskManager,
    pub links: Vec<Link>,
    /// Filesystem of the owning workflow.
    pub fs: Arc<dyn FileSystem>,
}

pub trait TaskFactory: Send + Sync {
    fn create(&self, spec: &JobSpec, ctx: TaskContext) -> Result<Box<dyn Task>>;
}

/// Builds [`ProcessTask`]s from raw inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTaskFactory;

impl TaskFactory for ProcessTaskFactory {
    fn create(&self, spec: &JobSpec, ctx: TaskContext) -> Result<Box<dyn Task>> {
        let input = match spec {
            JobSpec::Input(input) => input.clone(),
            JobSpec::Strategy(s) => {
                return Err(FlowError::InvalidJobSpec(format!(
                    "the process factory expects a raw input, got strategy '{}'",
                    s.kind
                )));
            }
        };
        input.validate()?;
        Ok(Box::new(ProcessTask::new(ctx, spec.clone(), input)?))
    }
}

/// Strategy `shell`: vars `command` (required), `produces` and `ncpus`
/// (optional); every other var is passed through to the input file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellStrategyFactory;

impl ShellStrategyFactory {
    fn input_from(strategy: &Strategy) -> Result<JobInput> {
        let mut vars = strategy.vars.clone();

        let command = match vars.remove("command") {
            Some(Value::String(cmd)) => cmd,
            Some(other) => {
                return Err(FlowError::InvalidJobSpec(format!(
                    "strategy '{}': `command` must be a string, got {other}",
                    strategy.kind
                )));
            }
            None => {
                return Err(FlowError::InvalidJobSpec(format!(
                    "strategy '{}' is missing `command`",
                    strategy.kind
                )));
            }
        };

        let produces = match vars.remove("produces") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    other => Err(FlowError::InvalidJobSpec(format!(
                        "strategy '{}': `produces` entries must be strings, got {other}",
                        strategy.kind
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(FlowError::InvalidJobSpec(format!(
                    "strategy '{}': `produces` must be a list, got {other}",
                    strategy.kind
                )));
            }
        };

        let ncpus = match vars.remove("ncpus") {
            None => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        FlowError::InvalidJobSpec(format!(
                            "strategy '{}': `ncpus` must be a positive integer",
                            strategy.kind
                        ))
                    })?,
            ),
        };

        let input = JobInput {
            command,
            vars,
            produces,
            ncpus,
        };
        input.validate()?;
        Ok(input)
    }
}

impl TaskFactory for ShellStrategyFactory {
    fn create(&self, spec: &JobSpec, ctx: TaskContext) -> Result<Box<dyn Task>> {
        let JobSpec::Strategy(strategy) = spec else {
            return Err(FlowError::InvalidJobSpec(
                "the shell strategy factory expects a strategy".to_string(),
            ));
        };
        let input = Self::input_from(strategy)?;
        Ok(Box::new(ProcessTask::new(ctx, spec.clone(), input)?))
    }
}

/// Factory lookup keyed on strategy kind, plus the generic factory for raw
/// inputs.
#[derive(Clone)]
pub struct TaskRegistry {
    strategies: HashMap<String, Arc<dyn TaskFactory>>,
    generic: Arc<dyn TaskFactory>,
}

impl TaskRegistry {
    /// Registry with only a generic factory and no strategies.
    pub fn new(generic: Arc<dyn TaskFactory>) -> Self {
        Self {
            strategies: HashMap::new(),
            generic,
        }
    }

    pub fn register_strategy(&mut self, kind: impl Into<String>, factory: Arc<dyn TaskFactory>) {
        self.strategies.insert(kind.into(), factory);
    }

    pub fn with_strategy(mut self, kind: impl Into<String>, factory: Arc<dyn TaskFactory>) -> Self {
        self.register_strategy(kind, factory);
        self
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.strategies.contains_key(kind)
    }

    pub fn create(&self, spec: &JobSpec, ctx: TaskContext) -> Result<Box<dyn Task>> {
        match spec {
            JobSpec::Strategy(s) => {
                let factory = self
                    .strategies
                    .get(&s.kind)
                    .ok_or_else(|| FlowError::UnsupportedJobSpec(s.kind.clone()))?;
                factory.create(spec, ctx)
            }
            JobSpec::Input(_) => self.generic.create(spec, ctx),
        }
    }
}

impl Default for TaskRegistry {
    /// Process tasks for raw inputs and the `shell` strategy.
    fn default() -> Self {
        Self::new(Arc::new(ProcessTaskFactory))
            .with_strategy("shell", Arc::new(ShellStrategyFactory))
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().collect();
        kinds.sort();
        f.debug_struct("TaskRegistry")
            .field("strategies", &kinds)
            .finish_non_exhaustive()
    }
}
