use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use simflow::dag::{Link, TaskId, TaskStatus, normalize_ext};
use simflow::engine::Workflow;
use simflow::errors::{FlowError, Result};
use simflow::exec::{BoxFuture, Runnable, Task, TaskContext, TaskFactory, TaskManager, TaskRegistry};
use simflow::fs::FileSystem;
use simflow::fs::mock::MockFileSystem;
use simflow::job::JobSpec;

/// Shared, ordered record of what fake tasks did (`"start task_0"`,
/// `"exit task_0 0"`, ...).
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Computes the contents written to every output of a fake task.
pub type OutputFn = Arc<dyn Fn(&JobSpec) -> String + Send + Sync>;

/// A task that never spawns a process.
///
/// Its behaviour is scripted through job variables:
/// - `exit_code` (default 0)
/// - `polls`: number of polls answering "still running" before exiting
/// - `fail_start`: `start()` fails
/// - `output`: contents written to each promised output file
///
/// On a zero exit it writes `outdata/out_<EXT>` for every promised extension
/// through the shared filesystem.
#[derive(Debug)]
pub struct FakeTask {
    id: TaskId,
    name: String,
    workdir: PathBuf,
    spec: JobSpec,
    manager: TaskManager,
    links: Vec<Link>,
    status: TaskStatus,
    produces: Vec<String>,
    ncpus: u32,
    exit_code: i32,
    polls_left: u64,
    fail_start: bool,
    output: String,
    returncode: Option<i32>,
    fs: Arc<dyn FileSystem>,
    log: EventLog,
}

impl FakeTask {
    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }

    fn finish(&mut self) {
        self.returncode = Some(self.exit_code);
        self.status = TaskStatus::Done;
        if self.exit_code == 0 {
            for ext in self.produces.clone() {
                if let Some(path) = self.output_path_for_extension(&ext) {
                    self.fs.write(&path, self.output.as_bytes()).unwrap();
                }
            }
        }
        self.record(format!("exit {} {}", self.name, self.exit_code));
    }

    fn outputs_exist(&self) -> bool {
        self.produces.iter().all(|ext| {
            self.output_path_for_extension(ext)
                .is_some_and(|p| self.fs.exists(&p))
        })
    }
}

impl Runnable for FakeTask {
    fn start(&mut self) -> Result<()> {
        if self.status.is_in_flight() {
            return Err(FlowError::Invariant(format!("{} already started", self.name)));
        }
        if self.fail_start {
            self.status = TaskStatus::Error;
            self.record(format!("fail {}", self.name));
            return Err(FlowError::Other(anyhow::anyhow!(
                "scripted start failure of {}",
                self.name
            )));
        }
        self.status = TaskStatus::Running;
        self.record(format!("start {}", self.name));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<i32>> {
        if !self.status.is_in_flight() {
            return Ok(self.returncode);
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Ok(None);
        }
        self.finish();
        Ok(self.returncode)
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32>> {
        Box::pin(async move {
            if self.status.is_in_flight() {
                self.polls_left = 0;
                self.finish();
            }
            self.returncode
                .ok_or_else(|| FlowError::Invariant(format!("{} never ran", self.name)))
        })
    }

    fn communicate(&mut self, _input: Option<String>) -> BoxFuture<'_, Result<(String, String)>> {
        Box::pin(async move {
            self.wait().await?;
            Ok((format!("{} stdout", self.name), String::new()))
        })
    }

    fn returncode(&self) -> Option<i32> {
        self.returncode
    }
}

impl Task for FakeTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    fn manager(&self) -> &TaskManager {
        &self.manager
    }

    fn links(&self) -> &[Link] {
        &self.links
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    fn total_cpus(&self) -> u32 {
        self.ncpus
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    fn check_status(&mut self) -> Result<()> {
        if self.status.is_in_flight() {
            self.poll()?;
        }
        if self.status == TaskStatus::Done {
            self.status = if self.returncode.unwrap_or(0) == 0 && self.outputs_exist() {
                TaskStatus::Ok
            } else {
                TaskStatus::Error
            };
        }
        Ok(())
    }

    fn build_workspace(&mut self) -> Result<()> {
        self.fs.create_dir_all(&self.outdata_dir())?;
        self.fs.create_dir_all(&self.indata_dir())?;
        Ok(())
    }
}

/// Builds [`FakeTask`]s for raw inputs and for the `fake` strategy.
#[derive(Clone)]
pub struct FakeTaskFactory {
    fs: Arc<dyn FileSystem>,
    log: EventLog,
    output: Option<OutputFn>,
}

impl fmt::Debug for FakeTaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTaskFactory").finish_non_exhaustive()
    }
}

impl FakeTaskFactory {
    pub fn new(fs: Arc<dyn FileSystem>, log: EventLog) -> Self {
        Self {
            fs,
            log,
            output: None,
        }
    }

    pub fn with_output(mut self, output: OutputFn) -> Self {
        self.output = Some(output);
        self
    }

    /// Registry where raw inputs and the `fake` strategy build fake tasks.
    pub fn registry(self) -> TaskRegistry {
        let factory = Arc::new(self);
        TaskRegistry::new(factory.clone()).with_strategy("fake", factory)
    }
}

impl TaskFactory for FakeTaskFactory {
    fn create(&self, spec: &JobSpec, ctx: TaskContext) -> Result<Box<dyn Task>> {
        let vars = spec.vars();
        let (produces, ncpus): (Vec<String>, Option<u32>) = match spec {
            JobSpec::Input(input) => (
                input.produces.iter().map(|e| normalize_ext(e)).collect(),
                input.ncpus,
            ),
            JobSpec::Strategy(_) => (
                vars.get("produces")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(normalize_ext)
                            .collect()
                    })
                    .unwrap_or_default(),
                vars.get("ncpus")
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
            ),
        };

        let output = match &self.output {
            Some(f) => f(spec),
            None => vars
                .get("output")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        Ok(Box::new(FakeTask {
            id: ctx.id,
            name: ctx.name,
            workdir: ctx.workdir,
            spec: spec.clone(),
            ncpus: ncpus.unwrap_or(ctx.manager.ncpus),
            manager: ctx.manager,
            links: ctx.links,
            status: TaskStatus::Init,
            produces,
            exit_code: vars.get("exit_code").and_then(Value::as_i64).unwrap_or(0) as i32,
            polls_left: vars.get("polls").and_then(Value::as_u64).unwrap_or(0),
            fail_start: vars.get("fail_start").and_then(Value::as_bool).unwrap_or(false),
            output,
            returncode: None,
            fs: self.fs.clone(),
            log: self.log.clone(),
        }))
    }
}

/// In-memory filesystem, event log and fake registry bundled together.
#[derive(Debug, Clone, Default)]
pub struct FakeEnv {
    pub fs: MockFileSystem,
    pub log: EventLog,
}

impl FakeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> FakeTaskFactory {
        FakeTaskFactory::new(Arc::new(self.fs.clone()), self.log.clone())
    }

    pub fn registry(&self) -> TaskRegistry {
        self.factory().registry()
    }

    /// Workflow at `/wf` backed by the mock filesystem and fake tasks.
    pub fn workflow(&self) -> Workflow {
        Workflow::new("/wf")
            .with_fs(Arc::new(self.fs.clone()))
            .with_registry(self.registry())
    }

    /// Same as [`FakeEnv::workflow`] with a custom output generator.
    pub fn workflow_with_output(&self, output: OutputFn) -> Workflow {
        Workflow::new("/wf")
            .with_fs(Arc::new(self.fs.clone()))
            .with_registry(self.factory().with_output(output).registry())
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}
