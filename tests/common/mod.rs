#![allow(dead_code, unused_imports)]

use std::sync::Arc;

use serde_json::json;
use simflow::engine::Workflow;
use simflow::job::{JobInput, JobSpec};

pub use simflow_test_utils::fake_task::{EventLog, FakeEnv, FakeTaskFactory, OutputFn};
pub use simflow_test_utils::{builders, capture_logs, init_tracing, with_timeout};

/// Raw input run by a fake task, promising `exts`.
pub fn fake_job(command: &str, exts: &[&str]) -> JobInput {
    JobInput::new(command).produces(exts)
}

/// Same as [`fake_job`] with a non-zero exit code.
pub fn failing_job(command: &str, exts: &[&str], code: i32) -> JobInput {
    fake_job(command, exts).with_var("exit_code", json!(code))
}

/// Output generator writing `etotal = <f(ecut)>` for a swept `ecut`.
pub fn etotal_output(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> OutputFn {
    Arc::new(move |spec: &JobSpec| {
        let ecut = spec.param("ecut").unwrap_or(0.0);
        format!("ecut = {ecut}\netotal = {}\n", f(ecut))
    })
}

/// Names of the tasks in registration order with their status.
pub fn statuses(workflow: &Workflow) -> Vec<(String, String)> {
    workflow
        .tasks()
        .map(|t| (t.name().to_string(), t.status().to_string()))
        .collect()
}
