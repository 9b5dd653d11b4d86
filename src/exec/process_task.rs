// src/exec/process_task.rs

//! Generic task that runs a shell command inside its working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::dag::{ConfigFragment, Link, TaskId, TaskStatus, normalize_ext};
use crate::errors::{FlowError, Result};
use crate::exec::backend::{BoxFuture, Runnable, Task};
use crate::exec::factory::TaskContext;
use crate::exec::manager::TaskManager;
use crate::fs::FileSystem;
use crate::job::{JobInput, JobSpec};
use crate::results::TaskResults;

/// Name of the input file written into the task directory.
pub const INPUT_FNAME: &str = "run.json";
/// Files receiving the process's stdout and stderr.
pub const LOG_FNAME: &str = "run.log";
pub const ERR_FNAME: &str = "run.err";

/// Task backed by an OS process.
///
/// Layout of the working directory:
///
/// ```text
/// task_<id>/
///   run.json      input variables (job vars + variables required by links)
///   run.log       stdout
///   run.err       stderr
///   indata/       in_<EXT> files linked from upstream producers
///   outdata/      out_<EXT> files this task promises
///   tmpdata/
/// ```
///
/// Stdout and stderr go to files rather than pipes, so a chatty process can
/// never block on a full pipe while nobody is reading.
///
/// The workspace, `run.json` and output checks go through the workflow's
/// [`FileSystem`]. The process itself, its log files and the `indata/`
/// symlinks need the host disk, so the filesystem must report
/// [`FileSystem::is_local_disk`].
#[derive(Debug)]
pub struct ProcessTask {
    id: TaskId,
    name: String,
    workdir: PathBuf,
    spec: JobSpec,
    input: JobInput,
    manager: TaskManager,
    links: Vec<Link>,
    status: TaskStatus,
    child: Option<Child>,
    returncode: Option<i32>,
    built: bool,
    errors: Vec<String>,
    fs: Arc<dyn FileSystem>,
}

impl ProcessTask {
    /// Fails with `Config` when the workflow filesystem is not the host disk.
    pub fn new(ctx: TaskContext, spec: JobSpec, input: JobInput) -> Result<Self> {
        if !ctx.fs.is_local_disk() {
            return Err(FlowError::Config(format!(
                "task {} runs an OS process and needs a workflow on the local disk, got {:?}",
                ctx.name, ctx.fs
            )));
        }
        Ok(Self {
            id: ctx.id,
            name: ctx.name,
            workdir: ctx.workdir,
            spec,
            input,
            manager: ctx.manager,
            links: ctx.links,
            status: TaskStatus::Init,
            child: None,
            returncode: None,
            built: false,
            errors: Vec::new(),
            fs: ctx.fs,
        })
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    pub fn log_path(&self) -> PathBuf {
        self.workdir.join(LOG_FNAME)
    }

    pub fn err_path(&self) -> PathBuf {
        self.workdir.join(ERR_FNAME)
    }

    /// Input variables with the link-required variables merged in.
    fn merged_vars(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut vars: serde_json::Map<_, _> = self
            .input
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut required = ConfigFragment::new();
        for link in &self.links {
            required.extend(link.required_config()?);
        }
        for (k, v) in required {
            vars.insert(k, serde_json::Value::from(v));
        }
        Ok(vars)
    }

    /// Make upstream products visible as `indata/in_<EXT>`.
    fn connect_links(&self) -> Result<()> {
        let indata = self.indata_dir();
        for link in &self.links {
            for product in link.products() {
                let src = product.path();
                if !self.fs.exists(src) {
                    return Err(FlowError::Other(anyhow::anyhow!(
                        "task {} needs {} from task {}, but the file does not exist",
                        self.name,
                        src.display(),
                        link.producer()
                    )));
                }
                let dest = indata.join(format!("in_{}", product.ext()));
                if self.fs.exists(&dest) {
                    self.fs.remove_file(&dest)?;
                }
                link_file(src, &dest)?;
                debug!(
                    task = %self.name,
                    src = %src.display(),
                    dest = %dest.display(),
                    "connected upstream product"
                );
            }
        }
        Ok(())
    }

    fn spawn(&mut self) -> Result<()> {
        let ncpus = self.total_cpus();
        let line = self.manager.command_line(&self.input.command, ncpus);

        let stdout = fs::File::create(self.log_path())?;
        let stderr = fs::File::create(self.err_path())?;

        let mut cmd = Command::new(&self.manager.shell);
        cmd.arg(self.manager.shell_flag())
            .arg(&line)
            .current_dir(&self.workdir)
            .envs(&self.manager.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        info!(task = %self.name, task_id = self.id, cmd = %line, ncpus, "starting task process");

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.name))?;
        self.child = Some(child);
        Ok(())
    }

    fn record_exit(&mut self, code: i32) {
        self.returncode = Some(code);
        self.child = None;
        if !self.status.is_finished() {
            self.status = TaskStatus::Done;
        }
        info!(task = %self.name, task_id = self.id, exit_code = code, "task process exited");
    }

    /// Turn `Done` into `Ok` or `Error`.
    fn validate_outputs(&mut self) {
        match self.returncode {
            Some(0) => {}
            Some(code) => {
                self.fail(format!("process exited with code {code}"));
                return;
            }
            // Restored from a snapshot: only the outputs can tell.
            None => {}
        }

        let missing: Vec<String> = self
            .input
            .produces
            .iter()
            .map(|ext| normalize_ext(ext))
            .filter(|ext| {
                self.output_path_for_extension(ext)
                    .is_none_or(|p| !self.fs.exists(&p))
            })
            .collect();

        if missing.is_empty() {
            self.status = TaskStatus::Ok;
            debug!(task = %self.name, task_id = self.id, "outputs validated");
        } else {
            self.fail(format!("missing output files for extensions {missing:?}"));
        }
    }

    fn fail(&mut self, message: String) {
        warn!(task = %self.name, task_id = self.id, %message, "task failed");
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
        self.status = TaskStatus::Error;
    }
}

#[cfg(unix)]
fn link_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(not(unix))]
fn link_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl Runnable for ProcessTask {
    fn start(&mut self) -> Result<()> {
        if self.child.is_some() || self.status.is_in_flight() {
            return Err(FlowError::Invariant(format!(
                "task {} is already {}",
                self.name, self.status
            )));
        }
        self.build_workspace()?;
        self.status = TaskStatus::Submitted;

        let launched = self.connect_links().and_then(|()| self.spawn());
        match launched {
            Ok(()) => {
                self.status = TaskStatus::Running;
                Ok(())
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn poll(&mut self) -> Result<Option<i32>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(self.returncode);
        };
        match child.try_wait()? {
            Some(status) => {
                let code = exit_code(status);
                self.record_exit(code);
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32>> {
        Box::pin(async move {
            if let Some(child) = self.child.as_mut() {
                let status = child
                    .wait()
                    .await
                    .with_context(|| format!("waiting for process of task '{}'", self.name))?;
                let code = exit_code(status);
                self.record_exit(code);
                return Ok(code);
            }
            self.returncode.ok_or_else(|| {
                FlowError::Invariant(format!("task {} was never started", self.name))
            })
        })
    }

    fn communicate(&mut self, input: Option<String>) -> BoxFuture<'_, Result<(String, String)>> {
        Box::pin(async move {
            if let Some(child) = self.child.as_mut() {
                if let Some(mut stdin) = child.stdin.take() {
                    if let Some(input) = input {
                        stdin
                            .write_all(input.as_bytes())
                            .await
                            .with_context(|| format!("writing stdin of task '{}'", self.name))?;
                    }
                    // Dropping stdin closes it so the process sees EOF.
                }
            }
            self.wait().await?;
            let stdout = self
                .fs
                .read_to_string(&self.log_path())
                .with_context(|| format!("reading stdout of task '{}'", self.name))?;
            let stderr = self
                .fs
                .read_to_string(&self.err_path())
                .with_context(|| format!("reading stderr of task '{}'", self.name))?;
            Ok((stdout, stderr))
        })
    }

    fn returncode(&self) -> Option<i32> {
        self.returncode
    }
}

impl Task for ProcessTask {
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
        if status != self.status {
            debug!(task = %self.name, from = %self.status, to = %status, "status change");
        }
        self.status = status;
    }

    fn total_cpus(&self) -> u32 {
        self.input.ncpus.unwrap_or(self.manager.ncpus)
    }

    fn produces(&self) -> &[String] {
        &self.input.produces
    }

    fn check_status(&mut self) -> Result<()> {
        if self.status.is_in_flight() {
            self.poll()?;
        }
        if self.status == TaskStatus::Done {
            self.validate_outputs();
        }
        Ok(())
    }

    fn build_workspace(&mut self) -> Result<()> {
        if self.built {
            return Ok(());
        }
        for dir in [
            self.workdir.clone(),
            self.indata_dir(),
            self.outdata_dir(),
            self.tmpdata_dir(),
        ] {
            self.fs.create_dir_all(&dir)?;
        }
        let vars = self.merged_vars()?;
        let contents = serde_json::to_string_pretty(&vars)?;
        self.fs
            .write(&self.workdir.join(INPUT_FNAME), contents.as_bytes())?;
        self.built = true;
        debug!(task = %self.name, workdir = %self.workdir.display(), "task workspace built");
        Ok(())
    }

    fn results(&self) -> TaskResults {
        let mut res = TaskResults::new(self.id, &self.name, self.status, self.returncode);
        for e in &self.errors {
            res.push_message(e.clone());
        }
        res
    }
}
