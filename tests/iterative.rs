// tests/iterative.rs

mod common;
use crate::common::{FakeEnv, etotal_output, fake_job, init_tracing, with_timeout};

use std::sync::{Arc, Mutex};

use serde_json::json;
use simflow::convergence::ToleranceTiers;
use simflow::engine::{
    ConvergenceStudy, ExitIteration, IterationStop, IterationVerdict, IterativeWorkflow, NeverExit,
    Workflow,
};
use simflow::errors::Result as FlowResult;
use simflow::job::{FromIter, JobGenerator, JobInput, JobQueue, JobSpec, Next, ParamSweep, SweepValues};

type TestResult = anyhow::Result<()>;

fn template() -> JobSpec {
    JobInput::new("abinit").produces(&["GSR"]).into()
}

fn sweep(values: &[f64]) -> Box<ParamSweep> {
    Box::new(ParamSweep::new(template(), "ecut", SweepValues::List(values.to_vec())))
}

fn study() -> ConvergenceStudy {
    ConvergenceStudy::new("ecut", "etotal", "GSR", ToleranceTiers::from_mev([1.0, 0.1, 0.01]))
}

/// `-10 + 10^-i` for `ecut = 10 + 5 i`: each step ten times closer.
fn plateau(ecut: f64) -> f64 {
    let i = ((ecut - 10.0) / 5.0).round() as i32;
    -10.0 + 10f64.powi(-i)
}

#[tokio::test]
async fn study_stops_once_the_high_tier_converges() -> TestResult {
    init_tracing();
    let env = FakeEnv::new();
    let wf = env.workflow_with_output(etotal_output(plateau));
    let values: Vec<f64> = (0..12).map(|i| 10.0 + 5.0 * i as f64).collect();

    let mut iter = IterativeWorkflow::new(wf, sweep(&values), Box::new(study()), 0);
    let stop = with_timeout(iter.start()).await?;

    assert_eq!(stop, IterationStop::Converged);
    assert_eq!(iter.stop_reason(), Some(IterationStop::Converged));
    assert_eq!(iter.workflow().len(), 9);
    assert_eq!(iter.data()["exit"], json!(true));
    assert_eq!(iter.data()["high"]["param"], json!(values[7]));

    let results = iter.get_results()?;
    assert!(results.exceptions().is_empty(), "{:?}", results.exceptions());
    assert_eq!(results.get("exit"), Some(&json!(true)));
    assert_eq!(results.task_results.len(), 9);
    Ok(())
}

#[tokio::test]
async fn max_iter_bounds_the_number_of_tasks() -> TestResult {
    let env = FakeEnv::new();
    let jobs = (0..10).map(|i| JobSpec::from(fake_job(&format!("job {i}"), &[])));
    let mut iter = IterativeWorkflow::new(
        env.workflow(),
        Box::new(FromIter::new(jobs)),
        Box::new(NeverExit),
        3,
    );

    let stop = with_timeout(iter.start()).await?;
    assert_eq!(stop, IterationStop::MaxIterations);
    assert_eq!(iter.workflow().len(), 3);
    assert!(iter.workflow().all_ok());
    Ok(())
}

#[tokio::test]
async fn exhausted_generator_ends_the_iteration() -> TestResult {
    let env = FakeEnv::new();
    let wf = env.workflow_with_output(etotal_output(plateau));
    let mut iter = IterativeWorkflow::new(wf, sweep(&[10.0, 15.0]), Box::new(NeverExit), 0);

    assert_eq!(with_timeout(iter.start()).await?, IterationStop::Exhausted);
    assert_eq!(iter.workflow().len(), 2);
    assert_eq!(
        env.events(),
        vec!["start task_0", "exit task_0 0", "start task_1", "exit task_1 0"]
    );
    Ok(())
}

#[tokio::test]
async fn pre_registered_tasks_run_first_and_count() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow_with_output(etotal_output(plateau));
    wf.register(fake_job("prepare", &[]), vec![])?;

    let mut iter = IterativeWorkflow::new(
        wf,
        sweep(&[10.0, 15.0, 20.0, 25.0]),
        Box::new(NeverExit),
        3,
    );
    assert_eq!(with_timeout(iter.start()).await?, IterationStop::MaxIterations);

    let wf = iter.into_workflow();
    assert_eq!(wf.len(), 3);
    assert_eq!(wf.task(0)?.spec().param("ecut"), None);
    assert_eq!(wf.task(1)?.spec().param("ecut"), Some(10.0));
    assert_eq!(wf.task(2)?.spec().param("ecut"), Some(15.0));
    assert!(wf.all_ok());
    Ok(())
}

/// Generator fed from outside the workflow.
struct SharedQueue(Arc<Mutex<JobQueue>>);

impl JobGenerator for SharedQueue {
    fn next_job(&mut self) -> Next {
        self.0.lock().unwrap().next_job()
    }
}

#[tokio::test]
async fn paused_generator_resumes_where_it_stopped() -> TestResult {
    let env = FakeEnv::new();
    let queue = Arc::new(Mutex::new(JobQueue::new()));
    queue.lock().unwrap().push(fake_job("first", &[]).into());

    let mut iter = IterativeWorkflow::new(
        env.workflow(),
        Box::new(SharedQueue(queue.clone())),
        Box::new(NeverExit),
        0,
    );
    assert_eq!(with_timeout(iter.start()).await?, IterationStop::Paused);
    assert_eq!(iter.workflow().len(), 1);

    {
        let mut q = queue.lock().unwrap();
        q.push(fake_job("second", &[]).into());
        q.push(fake_job("third", &[]).into());
    }
    assert_eq!(with_timeout(iter.submit_tasks()).await?, IterationStop::Paused);
    assert_eq!(iter.workflow().len(), 3);

    queue.lock().unwrap().close();
    assert_eq!(with_timeout(iter.submit_tasks()).await?, IterationStop::Exhausted);
    assert_eq!(iter.workflow().len(), 3);
    assert!(iter.workflow().all_ok());
    Ok(())
}

/// Stops after `after` tasks and reports how many it saw.
struct StopAfter {
    after: usize,
}

impl ExitIteration for StopAfter {
    fn exit_iteration(&mut self, workflow: &Workflow) -> FlowResult<IterationVerdict> {
        let seen = workflow.len();
        let verdict = if seen >= self.after {
            IterationVerdict::stop()
        } else {
            IterationVerdict::keep_going()
        };
        Ok(verdict.with_data([("seen".to_string(), json!(seen))].into()))
    }
}

#[tokio::test]
async fn exit_hook_data_reaches_the_results() -> TestResult {
    let env = FakeEnv::new();
    let jobs = (0..5).map(|i| JobSpec::from(fake_job(&format!("job {i}"), &[])));
    let mut iter = IterativeWorkflow::new(
        env.workflow(),
        Box::new(FromIter::new(jobs)),
        Box::new(StopAfter { after: 2 }),
        0,
    );

    assert_eq!(with_timeout(iter.start()).await?, IterationStop::Converged);
    let results = iter.get_results()?;
    assert_eq!(results.get("seen"), Some(&json!(2)));
    Ok(())
}

#[tokio::test]
async fn study_reports_non_decreasing_and_unreadable_points() -> TestResult {
    let env = FakeEnv::new();
    let output = Arc::new(|spec: &JobSpec| match spec.param("ecut") {
        Some(ecut) if ecut == 15.0 => "nothing useful\n".to_string(),
        Some(ecut) => format!("etotal = {}\n", ecut / 1000.0),
        None => String::new(),
    });
    let wf = env.workflow_with_output(output);
    let mut iter = IterativeWorkflow::new(
        wf,
        sweep(&[10.0, 15.0, 20.0, 30.0]),
        Box::new(study()),
        0,
    );

    assert_eq!(with_timeout(iter.start()).await?, IterationStop::Exhausted);

    let series = study().series(iter.workflow())?;
    assert_eq!(series.params, vec![10.0, 20.0, 30.0]);
    assert_eq!(series.values, vec![0.01, 0.02, 0.03]);
    assert_eq!(series.problems.len(), 1);
    assert!(series.problems[0].contains("task_1"));

    let results = iter.get_results()?;
    assert_eq!(results.get("exit"), Some(&json!(false)));
    let excs = results.exceptions();
    assert!(excs.iter().any(|e| e.contains("cannot read etotal of task task_1")));
    assert!(excs.iter().any(|e| e.starts_with("etotal is not decreasing")));
    Ok(())
}
