// tests/scheduler.rs

mod common;
use crate::common::{
    FakeEnv, capture_logs, failing_job, fake_job, init_tracing, statuses, with_timeout,
};

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use simflow::dag::TaskStatus;
use simflow::engine::{Fetch, Setup, SubmitPolicy, Workflow};
use simflow::errors::{FlowError, Result as FlowResult};
use simflow::exec::{Runnable, TaskManager};

type TestResult = Result<(), Box<dyn Error>>;

/// scf -> nscf (needs DEN), plus an independent task.
fn chain(env: &FakeEnv) -> Workflow {
    let mut wf = env.workflow();
    let scf = wf.register(fake_job("scf", &["DEN"]), vec![]).unwrap();
    let den = wf.produces(&scf, &["DEN"]).unwrap();
    wf.register(fake_job("nscf", &["WFK"]), vec![den]).unwrap();
    wf.register(fake_job("other", &[]), vec![]).unwrap();
    wf
}

#[tokio::test]
async fn fetch_follows_registration_order_and_dependencies() -> TestResult {
    init_tracing();
    let env = FakeEnv::new();
    let mut wf = chain(&env);

    assert_eq!(wf.fetch_task_to_run()?, Fetch::Task(0));
    assert_eq!(wf.task(0)?.status(), TaskStatus::Ready);
    assert_eq!(wf.task(1)?.status(), TaskStatus::Init);
    assert_eq!(wf.task(2)?.status(), TaskStatus::Ready);
    assert!(wf.can_run(0)?);
    assert!(!wf.can_run(1)?);

    assert_eq!(wf.run_task(0).await?, Some(0));
    assert_eq!(wf.task(0)?.status(), TaskStatus::Ok);
    assert!(env.fs.paths().contains(&Path::new("/wf/task_0/outdata/out_DEN").to_path_buf()));

    assert_eq!(wf.fetch_task_to_run()?, Fetch::Task(1));
    wf.run_task(1).await?;
    assert_eq!(wf.fetch_task_to_run()?, Fetch::Task(2));
    wf.run_task(2).await?;

    let (fetch, logs) = capture_logs(|| wf.fetch_task_to_run());
    assert_eq!(fetch?, Fetch::Exhausted);
    assert!(!logs.contains("possible deadlock"), "{logs}");
    assert!(wf.all_done());
    assert!(wf.all_ok());
    Ok(())
}

#[tokio::test]
async fn failed_producer_blocks_consumers() -> TestResult {
    init_tracing();
    let env = FakeEnv::new();
    let mut wf = env.workflow();
    let scf = wf.register(failing_job("scf", &["DEN"], 3), vec![]).unwrap();
    let den = wf.produces(&scf, &["DEN"]).unwrap();
    let nscf = wf.register(fake_job("nscf", &["WFK"]), vec![den]).unwrap();
    let wfk = wf.produces(&nscf, &["WFK"]).unwrap();
    wf.register(fake_job("bands", &[]), vec![wfk]).unwrap();

    assert_eq!(wf.run_task(0).await?, Some(3));
    assert_eq!(wf.task(0)?.status(), TaskStatus::Error);
    let (fetch, logs) = capture_logs(|| wf.fetch_task_to_run());
    assert_eq!(fetch?, Fetch::Unavailable);
    assert!(logs.contains("WARN"), "{logs}");
    assert!(logs.contains("possible deadlock"), "{logs}");
    assert!(logs.contains("blocked=[(1, 0), (2, 0)]"), "{logs}");

    assert_eq!(wf.blocked_tasks(), vec![(1, 0), (2, 0)]);
    assert_eq!(wf.links_status(1)?, vec![TaskStatus::Error]);
    assert!(!wf.all_done());
    assert!(!wf.is_completed(1)?);
    Ok(())
}

#[tokio::test]
async fn ready_is_never_demoted() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow();
    wf.register(fake_job("a", &[]), vec![]).unwrap();
    wf.task_mut(0)?.set_status(TaskStatus::Ready);
    wf.check_status()?;
    assert_eq!(wf.task(0)?.status(), TaskStatus::Ready);
    Ok(())
}

#[tokio::test]
async fn workflow_status_is_least_advanced() -> TestResult {
    let env = FakeEnv::new();
    let mut empty = env.workflow();
    assert_eq!(empty.workflow_status()?, TaskStatus::Ok);

    let mut wf = chain(&env);
    assert_eq!(wf.workflow_status()?, TaskStatus::Init);

    wf.run_task(0).await?;
    wf.run_task(2).await?;
    // nscf is Ready now.
    assert_eq!(wf.workflow_status()?, TaskStatus::Ready);

    wf.run_task(1).await?;
    assert_eq!(wf.workflow_status()?, TaskStatus::Ok);

    wf.task_mut(2)?.set_status(TaskStatus::Cancelled);
    assert_eq!(wf.current_status(), TaskStatus::Cancelled);

    let counter = wf.status_counter();
    assert_eq!(counter.get("Completed"), Some(&2));
    assert_eq!(counter.get("Cancelled"), Some(&1));
    Ok(())
}

#[tokio::test]
async fn cpu_accounting_tracks_in_flight_tasks() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow();
    for ncpus in [2, 3, 4] {
        wf.register(
            fake_job("run", &[]).with_ncpus(ncpus).with_var("polls", json!(10)),
            vec![],
        )?;
    }

    wf.task_mut(0)?.start()?;
    wf.task_mut(1)?.set_status(TaskStatus::Submitted);

    assert_eq!(wf.ncpus_inuse(), 2);
    assert_eq!(wf.ncpus_reserved(), 3);
    assert_eq!(wf.ncpus_allocated(), 5);

    assert_eq!(wf.poll()?, vec![None, None, None]);
    assert!(matches!(wf.read_scalar("GSR", "etotal"), Err(FlowError::NotAllDone)));
    Ok(())
}

#[tokio::test]
async fn sequential_submission_survives_failures() -> TestResult {
    init_tracing();
    let env = FakeEnv::new();
    let mut wf = env.workflow();
    let a = wf.register(fake_job("a", &["DEN"]), vec![])?;
    let den = wf.produces(&a, &["DEN"])?;
    let b = wf.register(failing_job("b", &["WFK"], 1), vec![den])?;
    let wfk = wf.produces(&b, &["WFK"])?;
    wf.register(fake_job("c", &[]), vec![wfk])?;
    wf.register(fake_job("d", &[]).with_var("fail_start", json!(true)), vec![])?;
    wf.register(fake_job("e", &[]), vec![])?;

    with_timeout(wf.start()).await?;

    assert_eq!(
        env.events(),
        vec![
            "start task_0",
            "exit task_0 0",
            "start task_1",
            "exit task_1 1",
            "fail task_3",
            "start task_4",
            "exit task_4 0",
        ]
    );
    let got: Vec<TaskStatus> = wf.tasks().map(|t| t.status()).collect();
    assert_eq!(
        got,
        vec![
            TaskStatus::Ok,
            TaskStatus::Error,
            TaskStatus::Init,
            TaskStatus::Error,
            TaskStatus::Ok,
        ]
    );
    assert_eq!(wf.returncodes(), vec![Some(0), Some(1), None, None, Some(0)]);
    Ok(())
}

#[tokio::test]
async fn concurrent_submission_respects_cpu_budget() -> TestResult {
    init_tracing();
    let env = FakeEnv::new();
    let mut wf = env.workflow().with_policy(SubmitPolicy::Concurrent {
        max_cpus: 4,
        poll_interval: Duration::from_millis(1),
    });
    for _ in 0..3 {
        wf.register(
            fake_job("run", &[]).with_ncpus(2).with_var("polls", json!(1)),
            vec![],
        )?;
    }

    with_timeout(wf.start()).await?;

    assert_eq!(
        env.events(),
        vec![
            "start task_0",
            "start task_1",
            "exit task_0 0",
            "exit task_1 0",
            "start task_2",
            "exit task_2 0",
        ]
    );
    assert!(wf.all_ok());
    Ok(())
}

#[tokio::test]
async fn concurrent_oversized_task_runs_alone() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow().with_policy(SubmitPolicy::Concurrent {
        max_cpus: 2,
        poll_interval: Duration::from_millis(1),
    });
    wf.register(fake_job("big", &[]).with_ncpus(4), vec![])?;
    wf.register(fake_job("small", &[]).with_ncpus(1), vec![])?;

    with_timeout(wf.submit_tasks()).await?;

    assert_eq!(
        env.events(),
        vec!["start task_0", "exit task_0 0", "start task_1", "exit task_1 0"]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_stops_when_everything_left_is_blocked() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow().with_policy(SubmitPolicy::Concurrent {
        max_cpus: 8,
        poll_interval: Duration::from_millis(1),
    });
    let a = wf.register(failing_job("a", &["DEN"], 2), vec![])?;
    let den = wf.produces(&a, &["DEN"])?;
    wf.register(fake_job("b", &[]), vec![den])?;

    with_timeout(wf.submit_tasks()).await?;

    assert_eq!(
        statuses(&wf),
        vec![
            ("task_0".to_string(), "Error".to_string()),
            ("task_1".to_string(), "Initialized".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn wait_and_communicate_drive_in_flight_tasks() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow();
    wf.register(fake_job("a", &[]).with_var("polls", json!(100)), vec![])?;
    wf.register(fake_job("b", &[]).with_var("polls", json!(100)), vec![])?;
    wf.register(fake_job("c", &[]), vec![])?;

    wf.task_mut(0)?.start()?;
    wf.task_mut(1)?.start()?;

    let out = wf.communicate(Some("go".to_string())).await?;
    assert_eq!(
        out,
        vec![
            (0, "task_0 stdout".to_string(), String::new()),
            (1, "task_1 stdout".to_string(), String::new()),
        ]
    );
    assert_eq!(wf.wait().await?, vec![Some(0), Some(0), None]);
    Ok(())
}

struct RegisterOnSetup;

impl Setup for RegisterOnSetup {
    fn setup(&mut self, workflow: &mut Workflow) -> FlowResult<()> {
        workflow.register(fake_job("from-setup", &[]), vec![])?;
        Ok(())
    }
}

#[tokio::test]
async fn setup_hook_runs_before_submission() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env.workflow().with_setup(Box::new(RegisterOnSetup));

    with_timeout(wf.start()).await?;

    assert_eq!(wf.len(), 1);
    assert_eq!(env.events(), vec!["start task_0", "exit task_0 0"]);
    for dir in ["/wf", "/wf/indata", "/wf/outdata", "/wf/tmpdata"] {
        assert!(env.fs.paths().contains(&Path::new(dir).to_path_buf()), "{dir}");
    }
    Ok(())
}

#[tokio::test]
async fn per_task_manager_sets_default_cpus() -> TestResult {
    let env = FakeEnv::new();
    let mut wf = env
        .workflow()
        .with_manager(TaskManager::default().with_ncpus(3));
    wf.register(fake_job("a", &[]).with_var("polls", json!(5)), vec![])?;
    wf.task_mut(0)?.start()?;
    assert_eq!(wf.ncpus_inuse(), 3);
    Ok(())
}

#[test]
fn dependency_graph_mirrors_links() {
    let env = FakeEnv::new();
    let wf = chain(&env);
    let graph = wf.dependency_graph();
    assert_eq!(graph.dependencies_of(1), vec![0]);
    assert_eq!(graph.dependents_of(0), vec![1]);
    assert!(graph.dependents_of(2).is_empty());
    assert_eq!(graph.downstream_of(0), vec![1]);
}
