#![allow(dead_code)]

use serde_json::{Value, json};
use simflow::config::{ConfigFile, LinkConfig, RawConfigFile, StudyConfig, TaskConfig};
use simflow::job::{JobInput, Strategy};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_workdir(mut self, workdir: &str) -> Self {
        self.config.workflow.workdir = workdir.into();
        self
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn with_study(mut self, study: StudyConfig) -> Self {
        self.config.study = Some(study);
        self
    }

    pub fn with_max_iter(mut self, max_iter: i64) -> Self {
        self.config.workflow.max_iter = max_iter;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// Task running a raw input with `command`.
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                input: Some(JobInput::new(command)),
                strategy: None,
                links: vec![],
                manager: None,
            },
        }
    }

    /// Task built from a strategy of the given kind.
    pub fn strategy(name: &str, kind: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                input: None,
                strategy: Some(Strategy::new(kind)),
                links: vec![],
                manager: None,
            },
        }
    }

    pub fn produces(mut self, exts: &[&str]) -> Self {
        if let Some(input) = self.task.input.take() {
            self.task.input = Some(input.produces(exts));
        }
        if let Some(strategy) = self.task.strategy.take() {
            let exts: Vec<Value> = exts.iter().map(|e| json!(e)).collect();
            self.task.strategy = Some(strategy.with_var("produces", exts));
        }
        self
    }

    pub fn var(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some(input) = self.task.input.take() {
            self.task.input = Some(input.with_var(name, value.clone()));
        }
        if let Some(strategy) = self.task.strategy.take() {
            self.task.strategy = Some(strategy.with_var(name, value));
        }
        self
    }

    pub fn link(mut self, task: &str, exts: &[&str]) -> Self {
        self.task.links.push(LinkConfig {
            task: task.to_string(),
            exts: exts.iter().map(|e| e.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `StudyConfig` sweeping `param` over explicit values.
pub struct StudyConfigBuilder {
    study: StudyConfig,
}

impl StudyConfigBuilder {
    pub fn new(param: &str, values: &[f64]) -> Self {
        Self {
            study: StudyConfig {
                param: param.to_string(),
                values: Some(values.to_vec()),
                start: None,
                step: None,
                stop: None,
                quantity: "etotal".to_string(),
                ext: "GSR".to_string(),
                tolerances_mev: [1.0, 0.1, 0.01],
                min_points: 1,
                monotonic_tol: None,
                template: json!({ "command": "run", "produces": ["GSR"] }),
            },
        }
    }

    pub fn range(mut self, start: f64, step: f64, stop: Option<f64>) -> Self {
        self.study.values = None;
        self.study.start = Some(start);
        self.study.step = Some(step);
        self.study.stop = stop;
        self
    }

    pub fn tolerances_mev(mut self, tolerances: [f64; 3]) -> Self {
        self.study.tolerances_mev = tolerances;
        self
    }

    pub fn template(mut self, template: Value) -> Self {
        self.study.template = template;
        self
    }

    pub fn build(self) -> StudyConfig {
        self.study
    }
}
