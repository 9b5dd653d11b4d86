// src/config/build.rs

//! Turning a validated config into a runnable workflow.

use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, StudyConfig};
use crate::convergence::ToleranceTiers;
use crate::engine::{ConvergenceStudy, IterativeWorkflow, TaskOptions, Workflow};
use crate::errors::{FlowError, Result};
use crate::exec::TaskRegistry;
use crate::job::ParamSweep;

/// What a config file describes.
#[derive(Debug)]
pub enum Plan {
    /// A fixed set of tasks.
    Tasks(Workflow),
    /// Fixed tasks (if any) followed by a convergence study.
    Study(IterativeWorkflow),
}

impl Plan {
    pub fn workflow(&self) -> &Workflow {
        match self {
            Plan::Tasks(wf) => wf,
            Plan::Study(iter) => iter.workflow(),
        }
    }
}

impl ConfigFile {
    /// Build the workflow rooted at `[workflow].workdir`, resolved against
    /// `base_dir` when relative.
    pub fn build(&self, base_dir: &Path, registry: TaskRegistry) -> Result<Plan> {
        let workdir = base_dir.join(&self.workflow.workdir);
        let mut workflow = Workflow::new(workdir)
            .with_registry(registry)
            .with_manager(self.manager.clone())
            .with_policy(self.workflow.submit_policy());

        for task in &self.task {
            let mut links = Vec::with_capacity(task.links.len());
            for link in &task.links {
                let producer = workflow.task_id_by_name(&link.task).ok_or_else(|| {
                    FlowError::Config(format!(
                        "task '{}' links to unknown task '{}'",
                        task.name, link.task
                    ))
                })?;
                let exts: Vec<&str> = link.exts.iter().map(String::as_str).collect();
                links.push(workflow.register_link(producer, &exts)?);
            }

            let mut options = TaskOptions::named(&task.name);
            options.manager = task.manager.clone();
            workflow.register_with(task.job_spec()?, links, options)?;
        }
        debug!(num_tasks = workflow.len(), "workflow built from config");

        match &self.study {
            None => Ok(Plan::Tasks(workflow)),
            Some(study) => Ok(Plan::Study(self.build_study(workflow, study)?)),
        }
    }

    fn build_study(&self, workflow: Workflow, study: &StudyConfig) -> Result<IterativeWorkflow> {
        let generator = ParamSweep::new(study.template_spec()?, &study.param, study.sweep_values()?);

        let mut exit = ConvergenceStudy::new(
            &study.param,
            &study.quantity,
            &study.ext,
            ToleranceTiers::from_mev(study.tolerances_mev),
        )
        .with_min_points(study.min_points);
        if let Some(tol) = study.monotonic_tol {
            exit = exit.with_monotonic_tol(tol);
        }

        Ok(IterativeWorkflow::new(
            workflow,
            Box::new(generator),
            Box::new(exit),
            self.workflow.max_iter(),
        ))
    }
}
