// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::SubmitPolicy;
use crate::errors::{FlowError, Result};
use crate::exec::TaskManager;
use crate::job::{JobInput, JobSpec, Strategy, SweepValues};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [workflow]
/// workdir = "runs/gw"
/// policy = "concurrent"
/// max_cpus = 8
///
/// [manager]
/// mpi_runner = "mpirun"
///
/// [[task]]
/// name = "scf"
/// input = { command = "abinit < run.in", produces = ["DEN"] }
///
/// [[task]]
/// name = "nscf"
/// input = { command = "abinit < run.in", produces = ["WFK"] }
/// links = [{ task = "scf", exts = ["DEN"] }]
/// ```
///
/// All sections are optional, but the file must describe at least one task
/// or a `[study]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Default resource manager, copied into every task.
    #[serde(default)]
    pub manager: TaskManager,

    /// Tasks in registration order. Links may only name earlier tasks.
    #[serde(default)]
    pub task: Vec<TaskConfig>,

    #[serde(default)]
    pub study: Option<StudyConfig>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub workflow: WorkflowSection,
    pub manager: TaskManager,
    pub task: Vec<TaskConfig>,
    pub study: Option<StudyConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            workflow: raw.workflow,
            manager: raw.manager,
            task: raw.task,
            study: raw.study,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Sequential,
    Concurrent,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSection {
    /// Relative paths are resolved against the config file's directory.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    #[serde(default)]
    pub policy: PolicyKind,

    /// CPU budget of the concurrent policy; defaults to the machine's
    /// available parallelism.
    #[serde(default)]
    pub max_cpus: Option<u32>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Iteration budget of a study; `<= 0` means unbounded.
    #[serde(default)]
    pub max_iter: i64,
}

fn default_workdir() -> PathBuf {
    PathBuf::from("simflow_run")
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            policy: PolicyKind::default(),
            max_cpus: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_iter: 0,
        }
    }
}

impl WorkflowSection {
    pub fn submit_policy(&self) -> SubmitPolicy {
        match self.policy {
            PolicyKind::Sequential => SubmitPolicy::Sequential,
            PolicyKind::Concurrent => SubmitPolicy::Concurrent {
                max_cpus: self.max_cpus.unwrap_or_else(available_cpus),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
        }
    }

    pub fn max_iter(&self) -> usize {
        usize::try_from(self.max_iter).unwrap_or(0)
    }
}

fn available_cpus() -> u32 {
    std::thread::available_parallelism()
        .ok()
        .and_then(|n| u32::try_from(n.get()).ok())
        .unwrap_or(1)
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,

    /// Raw job input. Exactly one of `input` / `strategy` must be set.
    #[serde(default)]
    pub input: Option<JobInput>,

    #[serde(default)]
    pub strategy: Option<Strategy>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Per-task manager replacing the `[manager]` default.
    #[serde(default)]
    pub manager: Option<TaskManager>,
}

impl TaskConfig {
    pub fn job_spec(&self) -> Result<JobSpec> {
        match (&self.input, &self.strategy) {
            (Some(input), None) => Ok(JobSpec::Input(input.clone())),
            (None, Some(strategy)) => Ok(JobSpec::Strategy(strategy.clone())),
            _ => Err(FlowError::Config(format!(
                "task '{}' needs exactly one of `input` or `strategy`",
                self.name
            ))),
        }
    }
}

/// Dependency on the outputs of an earlier task.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub task: String,

    /// Extensions of the producer's outputs to consume. Empty means an
    /// ordering-only dependency.
    #[serde(default)]
    pub exts: Vec<String>,
}

/// `[study]` section: sweep one parameter of a template job until a scalar
/// quantity converges.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    /// Input variable swept by the study.
    pub param: String,

    /// Explicit parameter values. Mutually exclusive with `start`/`step`.
    #[serde(default)]
    pub values: Option<Vec<f64>>,

    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    /// Inclusive upper bound of a `start`/`step` sweep.
    #[serde(default)]
    pub stop: Option<f64>,

    /// Scalar read from each task's output.
    pub quantity: String,

    /// Extension of the output holding `quantity`.
    pub ext: String,

    /// `[low, normal, high]` in meV.
    pub tolerances_mev: [f64; 3],

    #[serde(default = "default_min_points")]
    pub min_points: usize,

    #[serde(default)]
    pub monotonic_tol: Option<f64>,

    /// Job copied for every point, `{ command = ... }` or `{ kind = ... }`.
    pub template: Value,
}

fn default_min_points() -> usize {
    1
}

impl StudyConfig {
    pub fn template_spec(&self) -> Result<JobSpec> {
        JobSpec::try_from(self.template.clone())
    }

    pub fn sweep_values(&self) -> Result<SweepValues> {
        match (&self.values, self.start, self.step) {
            (Some(values), None, None) => Ok(SweepValues::List(values.clone())),
            (None, Some(start), Some(step)) => Ok(SweepValues::Range {
                start,
                step,
                stop: self.stop,
            }),
            _ => Err(FlowError::Config(
                "[study] needs either `values` or both `start` and `step`".to_string(),
            )),
        }
    }
}
