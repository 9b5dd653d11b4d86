// tests/config.rs

mod common;
use crate::common::FakeEnv;
use crate::common::builders::{ConfigFileBuilder, StudyConfigBuilder, TaskConfigBuilder};

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use simflow::config::{
    ConfigFile, Plan, PolicyKind, config_root_dir, load_and_validate, load_from_path, parse_str,
};
use simflow::dag::TaskStatus;
use simflow::engine::SubmitPolicy;
use simflow::errors::FlowError;
use simflow::job::{JobSpec, SweepValues};
use tempfile::tempdir;

const GW_TOML: &str = r#"
[workflow]
workdir = "runs/gw"
policy = "concurrent"
max_cpus = 8
poll_interval_ms = 50

[manager]
mpi_runner = "mpirun"
ncpus = 2

[[task]]
name = "scf"
input = { command = "abinit < run.in", produces = ["DEN"] }

[[task]]
name = "nscf"
input = { command = "abinit < run.in", produces = ["WFK"], ncpus = 4 }
links = [{ task = "scf", exts = ["DEN"] }]

[[task]]
name = "report"
strategy = { kind = "shell", vars = { command = "cat indata/*" } }
links = [{ task = "nscf" }]
"#;

fn validated(toml: &str) -> Result<ConfigFile, FlowError> {
    ConfigFile::try_from(parse_str(toml)?)
}

#[test]
fn parses_a_full_workflow() {
    let cfg = validated(GW_TOML).unwrap();

    assert_eq!(cfg.workflow.policy, PolicyKind::Concurrent);
    assert_eq!(
        cfg.workflow.submit_policy(),
        SubmitPolicy::Concurrent {
            max_cpus: 8,
            poll_interval: Duration::from_millis(50),
        }
    );
    assert_eq!(cfg.manager.mpi_runner.as_deref(), Some("mpirun"));
    assert_eq!(cfg.manager.shell, "sh");
    assert_eq!(cfg.task.len(), 3);
    assert_eq!(cfg.task[1].links[0].exts, vec!["DEN"]);
    assert!(cfg.task[2].links[0].exts.is_empty());
    assert!(matches!(cfg.task[2].job_spec().unwrap(), JobSpec::Strategy(_)));
    assert!(cfg.study.is_none());
}

#[test]
fn defaults_apply_to_missing_sections() {
    let cfg = validated(
        r#"
[[task]]
name = "only"
input = { command = "true" }
"#,
    )
    .unwrap();

    assert_eq!(cfg.workflow.workdir.to_str(), Some("simflow_run"));
    assert_eq!(cfg.workflow.submit_policy(), SubmitPolicy::Sequential);
    assert_eq!(cfg.workflow.max_iter(), 0);
    assert_eq!(cfg.manager.ncpus, 1);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = parse_str(
        r#"
[workflow]
wokrdir = "typo"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowError::Toml(_)));
}

#[test]
fn link_validation() {
    let forward = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("a", "run a").link("b", &["DEN"]).build())
        .with_task(TaskConfigBuilder::new("b", "run b").produces(&["DEN"]).build())
        .raw();
    assert!(matches!(
        ConfigFile::try_from(forward),
        Err(FlowError::ForwardLink { task: 0, producer: 1 })
    ));

    let own = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("a", "run a").link("a", &[]).build())
        .raw();
    assert!(matches!(
        ConfigFile::try_from(own),
        Err(FlowError::ForwardLink { task: 0, producer: 0 })
    ));

    let unknown = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("a", "run a").link("ghost", &[]).build())
        .raw();
    assert!(matches!(ConfigFile::try_from(unknown), Err(FlowError::Config(_))));
}

#[test]
fn task_validation() {
    let empty = ConfigFileBuilder::new().raw();
    assert!(matches!(ConfigFile::try_from(empty), Err(FlowError::Config(_))));

    let dup = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("a", "x").build())
        .with_task(TaskConfigBuilder::new("a", "y").build())
        .raw();
    assert!(matches!(ConfigFile::try_from(dup), Err(FlowError::Config(_))));

    let blank = ConfigFileBuilder::new()
        .with_task(TaskConfigBuilder::new("a", "  ").build())
        .raw();
    assert!(matches!(ConfigFile::try_from(blank), Err(FlowError::InvalidJobSpec(_))));

    let both = validated(
        r#"
[[task]]
name = "confused"
input = { command = "run" }
strategy = { kind = "shell" }
"#,
    );
    assert!(matches!(both, Err(FlowError::Config(_))));

    let zero_poll = validated(
        r#"
[workflow]
poll_interval_ms = 0

[[task]]
name = "a"
input = { command = "run" }
"#,
    );
    assert!(matches!(zero_poll, Err(FlowError::Config(_))));
}

#[test]
fn study_validation() {
    let ok = ConfigFileBuilder::new()
        .with_study(StudyConfigBuilder::new("ecut", &[10.0, 20.0]).build())
        .build();
    let study = ok.study.unwrap();
    assert_eq!(study.sweep_values().unwrap(), SweepValues::List(vec![10.0, 20.0]));

    let unordered = ConfigFileBuilder::new()
        .with_study(
            StudyConfigBuilder::new("ecut", &[10.0])
                .tolerances_mev([0.01, 0.1, 1.0])
                .build(),
        )
        .raw();
    assert!(matches!(ConfigFile::try_from(unordered), Err(FlowError::Config(_))));

    let no_values = ConfigFileBuilder::new()
        .with_study(StudyConfigBuilder::new("ecut", &[]).build())
        .raw();
    assert!(matches!(ConfigFile::try_from(no_values), Err(FlowError::Config(_))));

    let zero_step = ConfigFileBuilder::new()
        .with_study(StudyConfigBuilder::new("ecut", &[]).range(10.0, 0.0, None).build())
        .raw();
    assert!(matches!(ConfigFile::try_from(zero_step), Err(FlowError::Config(_))));

    let bad_template = ConfigFileBuilder::new()
        .with_study(
            StudyConfigBuilder::new("ecut", &[10.0])
                .template(json!({ "kind": "shell", "command": "run" }))
                .build(),
        )
        .raw();
    assert!(matches!(
        ConfigFile::try_from(bad_template),
        Err(FlowError::InvalidJobSpec(_))
    ));
}

#[test]
fn load_from_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("Simflow.toml");
    fs::write(&path, GW_TOML)?;

    let raw = load_from_path(&path)?;
    assert_eq!(raw.task.len(), 3);
    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.task[0].name, "scf");
    assert_eq!(config_root_dir(&path), dir.path());

    assert!(matches!(
        load_from_path(dir.path().join("missing.toml")),
        Err(FlowError::Io(_))
    ));

    fs::write(&path, "[[task]\nname = ")?;
    assert!(matches!(load_and_validate(&path), Err(FlowError::Toml(_))));
    Ok(())
}

#[test]
fn builds_tasks_with_links_and_managers() -> anyhow::Result<()> {
    let env = FakeEnv::new();
    let cfg = validated(GW_TOML)?;
    let base = tempdir()?;

    let registry = env.registry().with_strategy("shell", Arc::new(env.factory()));
    let plan = cfg.build(base.path(), registry)?;
    let Plan::Tasks(wf) = plan else {
        panic!("expected a plain task workflow");
    };

    assert_eq!(wf.workdir(), base.path().join("runs/gw"));
    assert_eq!(wf.len(), 3);
    assert_eq!(wf.task_id_by_name("nscf"), Some(1));
    assert_eq!(wf.links_of(1)[0].products()[0].ext(), "DEN");
    assert_eq!(wf.links_of(2)[0].producer(), 1);
    assert!(wf.links_of(2)[0].products().is_empty());
    assert_eq!(wf.task(0)?.manager().ncpus, 2);
    assert_eq!(wf.task(1)?.total_cpus(), 4);
    assert_eq!(wf.task(0)?.status(), TaskStatus::Init);
    Ok(())
}

#[test]
fn builds_a_study_plan() -> anyhow::Result<()> {
    let env = FakeEnv::new();
    let cfg = ConfigFileBuilder::new()
        .with_max_iter(5)
        .with_task(TaskConfigBuilder::new("prepare", "true").build())
        .with_study(StudyConfigBuilder::new("ecut", &[]).range(10.0, 5.0, Some(40.0)).build())
        .build();
    let base = tempdir()?;

    match cfg.build(base.path(), env.registry())? {
        Plan::Study(iter) => {
            assert_eq!(iter.max_iter(), 5);
            assert_eq!(iter.workflow().len(), 1);
            assert_eq!(iter.workflow().task(0)?.name(), "prepare");
        }
        Plan::Tasks(_) => panic!("expected a study"),
    }
    Ok(())
}
