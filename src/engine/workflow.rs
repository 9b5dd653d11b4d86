// src/engine/workflow.rs

//! Task container and scheduler.
//!
//! A [`Workflow`] owns an ordered list of tasks (task id == registration
//! index) and the links between them. Links may only point at tasks
//! registered earlier, so the dependency graph is acyclic by construction.
//!
//! Readiness is recomputed on every [`Workflow::check_status`]: first every
//! task refreshes its own status from its process, then every task still
//! waiting (`Init`) whose producers are all `Ok` is promoted to `Ready`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, Link, Product, TaskId, TaskStatus, normalize_ext};
use crate::engine::hooks::Setup;
use crate::errors::{FlowError, Result};
use crate::exec::{KeyValueReader, Scalar, ScalarReader, Task, TaskContext, TaskManager, TaskRegistry};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobSpec;
use crate::results::WorkflowResults;

/// Outcome of asking the scheduler for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// This task can be started now.
    Task(TaskId),
    /// Every task is finished; nothing will ever be runnable again.
    Exhausted,
    /// Nothing is runnable right now but some task is not finished.
    Unavailable,
}

/// How `submit_tasks` drives the tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmitPolicy {
    /// One task at a time, in registration order.
    #[default]
    Sequential,
    /// Every runnable task is launched as long as the allocated CPUs stay
    /// within `max_cpus`; in-flight tasks are polled every `poll_interval`.
    Concurrent {
        max_cpus: u32,
        poll_interval: Duration,
    },
}

/// Optional per-task overrides for [`Workflow::register_with`].
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Defaults to `task_<id>`.
    pub name: Option<String>,
    /// Defaults to a copy of the workflow's manager.
    pub manager: Option<TaskManager>,
}

impl TaskOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            manager: None,
        }
    }

    pub fn with_manager(mut self, manager: TaskManager) -> Self {
        self.manager = Some(manager);
        self
    }
}

pub struct Workflow {
    workdir: PathBuf,
    fs: Arc<dyn FileSystem>,
    reader: Arc<dyn ScalarReader>,
    registry: TaskRegistry,
    manager: TaskManager,
    policy: SubmitPolicy,
    tasks: Vec<Box<dyn Task>>,
    links: BTreeMap<TaskId, Vec<Link>>,
    setup: Option<Box<dyn Setup>>,
    built: bool,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("workdir", &self.workdir)
            .field("policy", &self.policy)
            .field("manager", &self.manager)
            .field("tasks", &self.tasks)
            .field("links", &self.links)
            .field("built", &self.built)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Workflow rooted at `workdir`, using the real filesystem, the default
    /// task registry and a default manager.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        Self {
            workdir: workdir.into(),
            reader: Arc::new(KeyValueReader::new(fs.clone())),
            fs,
            registry: TaskRegistry::default(),
            manager: TaskManager::default(),
            policy: SubmitPolicy::default(),
            tasks: Vec::new(),
            links: BTreeMap::new(),
            setup: None,
            built: false,
        }
    }

    /// Replace the filesystem. The scalar reader is reset to a
    /// [`KeyValueReader`] over the new filesystem.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.reader = Arc::new(KeyValueReader::new(fs.clone()));
        self.fs = fs;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn ScalarReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Default manager for tasks registered from now on.
    pub fn with_manager(mut self, manager: TaskManager) -> Self {
        self.manager = manager;
        self
    }

    pub fn with_policy(mut self, policy: SubmitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_setup(mut self, setup: Box<dyn Setup>) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Changing the default manager never affects already registered tasks.
    pub fn set_manager(&mut self, manager: TaskManager) {
        self.manager = manager;
    }

    pub fn policy(&self) -> SubmitPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SubmitPolicy) {
        self.policy = policy;
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn indata_dir(&self) -> PathBuf {
        self.workdir.join("indata")
    }

    pub fn outdata_dir(&self) -> PathBuf {
        self.workdir.join("outdata")
    }

    pub fn tmpdata_dir(&self) -> PathBuf {
        self.workdir.join("tmpdata")
    }

    pub fn path_in_workdir(&self, name: impl AsRef<Path>) -> PathBuf {
        self.workdir.join(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &dyn Task> {
        self.tasks.iter().map(|t| &**t)
    }

    pub fn task(&self, id: TaskId) -> Result<&dyn Task> {
        self.tasks
            .get(id)
            .map(|t| t.as_ref())
            .ok_or(FlowError::UnknownTask(id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut dyn Task> {
        match self.tasks.get_mut(id) {
            Some(task) => Ok(task.as_mut()),
            None => Err(FlowError::UnknownTask(id)),
        }
    }

    pub fn task_id_by_name(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().position(|t| t.name() == name)
    }

    /// Upstream links of `id`, as registered.
    pub fn links_of(&self, id: TaskId) -> &[Link] {
        self.links.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn links(&self) -> &BTreeMap<TaskId, Vec<Link>> {
        &self.links
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register a job as a new task depending on `links`.
    ///
    /// The returned link points at the new task without any product; use
    /// [`Workflow::produces`] on it to depend on specific outputs.
    pub fn register(&mut self, spec: impl Into<JobSpec>, links: Vec<Link>) -> Result<Link> {
        self.register_with(spec, links, TaskOptions::default())
    }

    /// [`Workflow::register`] with a custom name or manager.
    ///
    /// The task receives its own copy of the manager, taken now. Nothing is
    /// registered if any step fails.
    pub fn register_with(
        &mut self,
        spec: impl Into<JobSpec>,
        links: Vec<Link>,
        options: TaskOptions,
    ) -> Result<Link> {
        let spec = spec.into();
        let id = self.tasks.len();

        for link in &links {
            self.validate_link(id, link)?;
        }

        let name = options.name.unwrap_or_else(|| format!("task_{id}"));
        if self.task_id_by_name(&name).is_some() {
            return Err(FlowError::Config(format!("duplicate task name '{name}'")));
        }

        let ctx = TaskContext {
            id,
            name,
            workdir: self.workdir.join(format!("task_{id}")),
            manager: options.manager.unwrap_or_else(|| self.manager.clone()),
            links: links.clone(),
            fs: self.fs.clone(),
        };
        let task = self.registry.create(&spec, ctx)?;
        if task.id() != id {
            return Err(FlowError::Invariant(format!(
                "factory built task {} while registering task {id}",
                task.id()
            )));
        }

        info!(
            task = %task.name(),
            task_id = id,
            job = %spec.describe(),
            num_links = links.len(),
            "registered task"
        );
        self.tasks.push(task);
        if !links.is_empty() {
            self.links.insert(id, links);
        }
        Ok(Link::to_task(id))
    }

    fn validate_link(&self, consumer: TaskId, link: &Link) -> Result<()> {
        let producer = link.producer();
        if producer >= consumer {
            return Err(FlowError::ForwardLink {
                task: consumer,
                producer,
            });
        }
        let task = self.task(producer)?;
        for product in link.products() {
            match task.output_path_for_extension(product.ext()) {
                Some(path) if path == product.path() => {}
                _ => {
                    return Err(FlowError::UnknownProduct {
                        task: producer,
                        ext: product.ext().to_string(),
                    });
                }
            }
        }
        link.required_config()?;
        Ok(())
    }

    /// Link to the outputs of `producer` tagged with `exts`.
    pub fn register_link(&self, producer: TaskId, exts: &[&str]) -> Result<Link> {
        let task = self.task(producer)?;
        let products = exts
            .iter()
            .map(|ext| {
                task.output_path_for_extension(ext)
                    .map(|path| Product::new(ext, path))
                    .ok_or_else(|| FlowError::UnknownProduct {
                        task: producer,
                        ext: normalize_ext(ext),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Link::new(producer, products))
    }

    /// Chaining form of [`Workflow::register_link`] on a link returned by
    /// [`Workflow::register`].
    pub fn produces(&self, link: &Link, exts: &[&str]) -> Result<Link> {
        self.register_link(link.producer(), exts)
    }

    // ---------------------------------------------------------------------
    // Readiness
    // ---------------------------------------------------------------------

    /// Live status of the link's producer.
    pub fn link_status(&self, link: &Link) -> Result<TaskStatus> {
        Ok(self.task(link.producer())?.status())
    }

    pub fn links_status(&self, id: TaskId) -> Result<Vec<TaskStatus>> {
        self.task(id)?;
        self.links_of(id)
            .iter()
            .map(|l| self.link_status(l))
            .collect()
    }

    fn links_ok(&self, id: TaskId) -> bool {
        self.links_of(id).iter().all(|l| {
            self.tasks
                .get(l.producer())
                .is_some_and(|t| t.status().is_ok())
        })
    }

    /// `Ready` and every producer `Ok`.
    pub fn can_run(&self, id: TaskId) -> Result<bool> {
        Ok(self.task(id)?.status().is_runnable() && self.links_ok(id))
    }

    pub fn is_completed(&self, id: TaskId) -> Result<bool> {
        Ok(self.task(id)?.status().is_finished())
    }

    /// Refresh every task, then promote waiting tasks whose producers are
    /// all `Ok`.
    pub fn check_status(&mut self) -> Result<()> {
        for task in self.tasks.iter_mut() {
            if let Err(e) = task.check_status() {
                warn!(
                    task = %task.name(),
                    task_id = task.id(),
                    error = %e,
                    "failed to refresh task status; marking it as failed"
                );
                task.set_status(TaskStatus::Error);
            }
        }

        for id in 0..self.tasks.len() {
            let status = self.tasks[id].status();
            if status.is_before(TaskStatus::Ready) && self.links_ok(id) {
                self.tasks[id].set_status(TaskStatus::Ready);
                debug!(task = %self.tasks[id].name(), task_id = id, "dependencies satisfied; task is ready");
            }
        }
        Ok(())
    }

    fn first_runnable(&self) -> Option<TaskId> {
        (0..self.tasks.len()).find(|&id| self.tasks[id].status().is_runnable() && self.links_ok(id))
    }

    /// Every task finished (`Done`, `Ok`, `Error` or `Cancelled`).
    pub fn all_done(&self) -> bool {
        self.tasks.iter().all(|t| t.status().is_finished())
    }

    pub fn all_ok(&self) -> bool {
        self.tasks.iter().all(|t| t.status().is_ok())
    }

    fn num_in_flight(&self) -> usize {
        self.tasks.iter().filter(|t| t.status().is_in_flight()).count()
    }

    /// First runnable task in registration order.
    pub fn fetch_task_to_run(&mut self) -> Result<Fetch> {
        self.check_status()?;

        if let Some(id) = self.first_runnable() {
            return Ok(Fetch::Task(id));
        }
        if self.all_done() {
            return Ok(Fetch::Exhausted);
        }

        let blocked = self.blocked_tasks();
        warn!(
            in_flight = self.num_in_flight(),
            ?blocked,
            "no task can run now; possible deadlock"
        );
        Ok(Fetch::Unavailable)
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_links(self.tasks.len(), &self.links)
    }

    /// `(task, failed_root)` for every unfinished task that can never run
    /// because something upstream failed.
    pub fn blocked_tasks(&self) -> Vec<(TaskId, TaskId)> {
        let failed: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.status().is_failed())
            .map(|t| t.id())
            .collect();
        if failed.is_empty() {
            return Vec::new();
        }
        self.dependency_graph()
            .blocked_by(&failed)
            .into_iter()
            .filter(|(id, _)| !self.tasks[*id].status().is_finished())
            .collect()
    }

    // ---------------------------------------------------------------------
    // Accounting
    // ---------------------------------------------------------------------

    fn cpus_where(&self, pred: impl Fn(TaskStatus) -> bool) -> u32 {
        self.tasks
            .iter()
            .filter(|t| pred(t.status()))
            .map(|t| t.total_cpus())
            .sum()
    }

    /// CPUs of tasks queued but not yet running.
    pub fn ncpus_reserved(&self) -> u32 {
        self.cpus_where(|s| s == TaskStatus::Submitted)
    }

    /// CPUs of tasks queued or running.
    pub fn ncpus_allocated(&self) -> u32 {
        self.cpus_where(TaskStatus::is_in_flight)
    }

    /// CPUs of running tasks.
    pub fn ncpus_inuse(&self) -> u32 {
        self.cpus_where(|s| s == TaskStatus::Running)
    }

    /// Least advanced status over all tasks, after a refresh.
    ///
    /// An empty workflow reports `Ok`.
    pub fn workflow_status(&mut self) -> Result<TaskStatus> {
        self.check_status()?;
        Ok(self.current_status())
    }

    /// [`Workflow::workflow_status`] without refreshing.
    pub fn current_status(&self) -> TaskStatus {
        self.tasks
            .iter()
            .map(|t| t.status())
            .min_by_key(|s| s.progress())
            .unwrap_or(TaskStatus::Ok)
    }

    /// Number of tasks per status label.
    pub fn status_counter(&self) -> BTreeMap<String, usize> {
        let mut counter = BTreeMap::new();
        for task in &self.tasks {
            *counter.entry(task.status().to_string()).or_insert(0) += 1;
        }
        counter
    }

    // ---------------------------------------------------------------------
    // Workspace and execution
    // ---------------------------------------------------------------------

    /// Create the workspace directories and every task's workspace.
    /// Calling it again is harmless.
    pub fn build(&mut self) -> Result<()> {
        if !self.built {
            for dir in [
                self.workdir.clone(),
                self.indata_dir(),
                self.outdata_dir(),
                self.tmpdata_dir(),
            ] {
                self.fs.create_dir_all(&dir)?;
            }
            self.built = true;
            debug!(workdir = %self.workdir.display(), "workflow workspace built");
        }
        for task in self.tasks.iter_mut() {
            task.build_workspace()?;
        }
        Ok(())
    }

    /// Build, run the setup hook, then submit tasks.
    pub async fn start(&mut self) -> Result<()> {
        self.build()?;
        if let Some(mut setup) = self.setup.take() {
            let outcome = setup.setup(self);
            self.setup = Some(setup);
            outcome?;
        }
        self.submit_tasks().await
    }

    /// Drive tasks until nothing more can run, following the submit policy.
    pub async fn submit_tasks(&mut self) -> Result<()> {
        info!(num_tasks = self.tasks.len(), policy = ?self.policy, "submitting tasks");
        match self.policy {
            SubmitPolicy::Sequential => self.submit_sequential().await?,
            SubmitPolicy::Concurrent {
                max_cpus,
                poll_interval,
            } => self.submit_concurrent(max_cpus, poll_interval).await?,
        }
        info!(status_counter = ?self.status_counter(), "submission finished");
        Ok(())
    }

    async fn submit_sequential(&mut self) -> Result<()> {
        loop {
            match self.fetch_task_to_run()? {
                Fetch::Task(id) => {
                    self.run_task(id).await?;
                }
                Fetch::Exhausted => break,
                Fetch::Unavailable => {
                    let in_flight = (0..self.tasks.len())
                        .find(|&id| self.tasks[id].status().is_in_flight());
                    match in_flight {
                        Some(id) => {
                            self.wait_task(id).await;
                            self.check_status()?;
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn submit_concurrent(&mut self, max_cpus: u32, poll_interval: Duration) -> Result<()> {
        loop {
            self.check_status()?;

            let mut launched = 0;
            while let Some(id) = self.first_runnable() {
                let needed = self.tasks[id].total_cpus();
                let allocated = self.ncpus_allocated();
                // A task larger than the budget still runs, alone.
                if allocated > 0 && allocated + needed > max_cpus {
                    debug!(task_id = id, needed, allocated, max_cpus, "cpu budget full; waiting");
                    break;
                }
                self.launch(id);
                launched += 1;
            }

            if self.all_done() {
                break;
            }
            if launched == 0 && self.num_in_flight() == 0 {
                warn!(
                    blocked = ?self.blocked_tasks(),
                    "no task can run and none is in flight; stopping submission"
                );
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }
        Ok(())
    }

    /// Start task `id`. A task that fails to start is marked `Error`;
    /// siblings are unaffected.
    fn launch(&mut self, id: TaskId) -> bool {
        let task = &mut self.tasks[id];
        match task.start() {
            Ok(()) => {
                info!(task = %task.name(), task_id = id, ncpus = task.total_cpus(), "task started");
                true
            }
            Err(e) => {
                warn!(task = %task.name(), task_id = id, error = %e, "task failed to start");
                if !task.status().is_failed() {
                    task.set_status(TaskStatus::Error);
                }
                false
            }
        }
    }

    async fn wait_task(&mut self, id: TaskId) -> Option<i32> {
        let task = &mut self.tasks[id];
        match task.wait().await {
            Ok(code) => Some(code),
            Err(e) => {
                warn!(task = %task.name(), task_id = id, error = %e, "waiting for task failed");
                task.set_status(TaskStatus::Error);
                None
            }
        }
    }

    /// Start task `id`, wait for it and refresh all statuses.
    ///
    /// Returns the exit code, `None` if the task could not be run.
    pub async fn run_task(&mut self, id: TaskId) -> Result<Option<i32>> {
        self.task(id)?;
        let code = if self.launch(id) {
            self.wait_task(id).await
        } else {
            None
        };
        self.check_status()?;
        Ok(code)
    }

    /// Poll every task. `None` for tasks that haven't exited.
    pub fn poll(&mut self) -> Result<Vec<Option<i32>>> {
        self.tasks.iter_mut().map(|t| t.poll()).collect()
    }

    /// Wait for every started task and return all exit codes.
    pub async fn wait(&mut self) -> Result<Vec<Option<i32>>> {
        for task in self.tasks.iter_mut() {
            if task.status().is_in_flight() {
                task.wait().await?;
            }
        }
        Ok(self.returncodes())
    }

    /// Forward `input` to every in-flight task and collect
    /// `(task, stdout, stderr)`.
    pub async fn communicate(&mut self, input: Option<String>) -> Result<Vec<(TaskId, String, String)>> {
        let mut out = Vec::new();
        for task in self.tasks.iter_mut() {
            if task.status().is_in_flight() {
                let (stdout, stderr) = task.communicate(input.clone()).await?;
                out.push((task.id(), stdout, stderr));
            }
        }
        Ok(out)
    }

    pub fn returncodes(&self) -> Vec<Option<i32>> {
        self.tasks.iter().map(|t| t.returncode()).collect()
    }

    // ---------------------------------------------------------------------
    // Results
    // ---------------------------------------------------------------------

    /// Read `name` from the `ext` output of every task.
    ///
    /// Fails with `NotAllDone` while some task is unfinished.
    pub fn read_scalar(&self, ext: &str, name: &str) -> Result<Vec<Scalar>> {
        if !self.all_done() {
            return Err(FlowError::NotAllDone);
        }
        Ok(self
            .tasks
            .iter()
            .map(|task| match task.output_path_for_extension(ext) {
                Some(path) => self.reader.read_scalar(&path, name),
                None => Scalar::Unreadable(format!(
                    "task {} does not produce '{}'",
                    task.name(),
                    normalize_ext(ext)
                )),
            })
            .collect())
    }

    pub fn get_results(&self) -> WorkflowResults {
        WorkflowResults::new(self.tasks.iter().map(|t| t.results()))
    }

    /// Delete the workflow directory.
    ///
    /// With a non-empty `exclude_wildcard` (glob patterns separated by `|`,
    /// e.g. `"*.json|*.log"`), only files whose name matches none of the
    /// patterns are removed and the directory tree is kept.
    pub fn rmtree(&self, exclude_wildcard: &str) -> Result<()> {
        if !self.fs.exists(&self.workdir) {
            return Ok(());
        }
        if exclude_wildcard.trim().is_empty() {
            self.fs.remove_dir_all(&self.workdir)?;
            info!(workdir = %self.workdir.display(), "removed workflow directory");
            return Ok(());
        }

        let keep = build_globset(exclude_wildcard)?;
        let mut stack = vec![self.workdir.clone()];
        while let Some(dir) = stack.pop() {
            for path in self.fs.read_dir(&dir)? {
                if self.fs.is_dir(&path) {
                    stack.push(path);
                    continue;
                }
                let keep_it = path
                    .file_name()
                    .is_some_and(|name| keep.is_match(Path::new(name)));
                if !keep_it {
                    self.fs.remove_file(&path)?;
                    debug!(path = %path.display(), "removed file");
                }
            }
        }
        Ok(())
    }
}

fn build_globset(wildcard: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in wildcard.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let glob = Glob::new(pattern)
            .map_err(|e| FlowError::Config(format!("invalid wildcard '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| FlowError::Config(format!("invalid wildcard '{wildcard}': {e}")))
}
