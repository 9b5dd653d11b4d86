// src/job/spec.rs

//! Job specifications: what a task should run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FlowError, Result};

/// Free-form input variables of a job.
pub type InputVars = BTreeMap<String, Value>;

/// Either a high-level strategy (turned into a task by the factory registered
/// for its `kind`) or a raw, fully specified input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobSpec {
    Strategy(Strategy),
    Input(JobInput),
}

impl JobSpec {
    /// Input variables, whichever the flavour.
    pub fn vars(&self) -> &InputVars {
        match self {
            JobSpec::Strategy(s) => &s.vars,
            JobSpec::Input(i) => &i.vars,
        }
    }

    pub fn as_input(&self) -> Option<&JobInput> {
        match self {
            JobSpec::Input(i) => Some(i),
            JobSpec::Strategy(_) => None,
        }
    }

    /// Numeric value of an input variable, if present and numeric.
    pub fn param(&self, name: &str) -> Option<f64> {
        self.vars().get(name).and_then(Value::as_f64)
    }

    /// Short description used in logs.
    pub fn describe(&self) -> String {
        match self {
            JobSpec::Strategy(s) => format!("strategy '{}'", s.kind),
            JobSpec::Input(i) => format!("input `{}`", i.command),
        }
    }
}

/// High-level job description keyed by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub kind: String,
    #[serde(default)]
    pub vars: InputVars,
}

impl Strategy {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            vars: InputVars::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

/// Fully specified job: the command line plus its input variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub command: String,
    #[serde(default)]
    pub vars: InputVars,
    /// Extensions of the output files this job promises.
    #[serde(default)]
    pub produces: Vec<String>,
    /// CPUs requested; `None` uses the manager default.
    #[serde(default)]
    pub ncpus: Option<u32>,
}

impl JobInput {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            vars: InputVars::new(),
            produces: Vec::new(),
            ncpus: None,
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn produces(mut self, exts: &[&str]) -> Self {
        self.produces.extend(exts.iter().map(|e| e.to_string()));
        self
    }

    pub fn with_ncpus(mut self, ncpus: u32) -> Self {
        self.ncpus = Some(ncpus);
        self
    }

    /// Reject inputs that cannot possibly run.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(FlowError::InvalidJobSpec(
                "job input has an empty command".to_string(),
            ));
        }
        if self.ncpus == Some(0) {
            return Err(FlowError::InvalidJobSpec(
                "job input requests 0 cpus".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<Strategy> for JobSpec {
    fn from(s: Strategy) -> Self {
        JobSpec::Strategy(s)
    }
}

impl From<JobInput> for JobSpec {
    fn from(i: JobInput) -> Self {
        JobSpec::Input(i)
    }
}

impl TryFrom<Value> for JobSpec {
    type Error = FlowError;

    /// Accept a loosely typed job description: an object carrying either a
    /// `kind` (strategy) or a `command` (raw input).
    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let obj = value.as_object().ok_or_else(|| {
            FlowError::InvalidJobSpec(format!("expected an object, got {value}"))
        })?;
        match (obj.contains_key("kind"), obj.contains_key("command")) {
            (true, false) => Ok(JobSpec::Strategy(serde_json::from_value(value)?)),
            (false, true) => Ok(JobSpec::Input(serde_json::from_value(value)?)),
            _ => Err(FlowError::InvalidJobSpec(
                "a job needs exactly one of `kind` (strategy) or `command` (input)".to_string(),
            )),
        }
    }
}
