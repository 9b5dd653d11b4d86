// src/lib.rs

pub mod cli;
pub mod config;
pub mod convergence;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod results;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, Plan, config_root_dir, load_and_validate};
use crate::engine::Workflow;
use crate::exec::TaskRegistry;
use crate::results::WorkflowResults;

/// File the `run` command writes the aggregated results to.
pub const RESULTS_FNAME: &str = "results.json";

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run => run_workflow(Path::new(&args.config)).await,
        Command::DryRun => {
            let cfg = load_config(Path::new(&args.config))?;
            print_dry_run(&cfg);
            Ok(())
        }
        Command::Status { workdir } => print_status(&workdir),
    }
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    load_and_validate(path).with_context(|| format!("loading config {}", path.display()))
}

async fn run_workflow(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let root = config_root_dir(config_path);
    let mut plan = cfg.build(&root, TaskRegistry::default())?;

    let mut results = match &mut plan {
        Plan::Tasks(workflow) => {
            workflow.start().await?;
            workflow.get_results()
        }
        Plan::Study(iterative) => {
            let stop = iterative.start().await?;
            info!(?stop, "study finished");
            iterative.get_results()?
        }
    };

    let workflow = plan.workflow();
    workflow.save()?;

    let problems = results.assert_valid().len();
    let results_path = workflow.path_in_workdir(RESULTS_FNAME);
    results.json_dump(&**workflow.fs(), &results_path)?;

    print_summary(workflow, &results, &results_path);
    if problems > 0 {
        anyhow::bail!("workflow finished with {problems} problem(s); see {}", results_path.display());
    }
    Ok(())
}

fn print_summary(workflow: &Workflow, results: &WorkflowResults, results_path: &Path) {
    println!("workflow: {}", workflow.workdir().display());
    println!("status:   {}", workflow.current_status());
    for (status, count) in workflow.status_counter() {
        println!("  {status:<12} {count}");
    }
    for exc in results.exceptions() {
        warn!(problem = %exc, "workflow problem");
        println!("  ! {exc}");
    }
    println!("results:  {}", results_path.display());
}

/// Print tasks, links and the study, without executing anything.
fn print_dry_run(cfg: &ConfigFile) {
    println!("simflow dry-run");
    println!("  workflow.workdir = {}", cfg.workflow.workdir.display());
    println!("  workflow.policy  = {:?}", cfg.workflow.submit_policy());
    println!("  manager.shell    = {}", cfg.manager.shell);
    if let Some(runner) = &cfg.manager.mpi_runner {
        println!("  manager.mpi_runner = {runner}");
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (id, task) in cfg.task.iter().enumerate() {
        println!("  [{id}] {}", task.name);
        if let Some(input) = &task.input {
            println!("      command: {}", input.command);
            if !input.produces.is_empty() {
                println!("      produces: {:?}", input.produces);
            }
        }
        if let Some(strategy) = &task.strategy {
            println!("      strategy: {}", strategy.kind);
        }
        for link in &task.links {
            println!("      after: {} {:?}", link.task, link.exts);
        }
    }

    if let Some(study) = &cfg.study {
        println!();
        println!("study:");
        println!("  param     = {}", study.param);
        println!("  quantity  = {} (from {})", study.quantity, study.ext);
        println!("  tolerances_mev [low, normal, high] = {:?}", study.tolerances_mev);
        println!("  min_points = {}", study.min_points);
        match cfg.workflow.max_iter() {
            0 => println!("  max_iter  = unbounded"),
            n => println!("  max_iter  = {n}"),
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_status(workdir: &Path) -> Result<()> {
    let workflow = Workflow::restore(workdir, TaskRegistry::default())
        .with_context(|| format!("restoring workflow from {}", workdir.display()))?;

    println!("workflow: {}", workflow.workdir().display());
    println!("status:   {}", workflow.current_status());
    for task in workflow.tasks() {
        println!("  [{}] {:<16} {}", task.id(), task.name(), task.status());
    }
    println!(
        "cpus: reserved={} allocated={} inuse={}",
        workflow.ncpus_reserved(),
        workflow.ncpus_allocated(),
        workflow.ncpus_inuse()
    );
    Ok(())
}
