// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`workflow`] is the task container and scheduler.
//! - [`iterative`] grows a workflow one task at a time from a job generator.
//! - [`hooks`] holds the `Setup` / `ExitIteration` extension points.
//! - [`study`] is the convergence-study exit hook.
//! - [`snapshot`] saves and restores a workflow as JSON.

pub mod hooks;
pub mod iterative;
pub mod snapshot;
pub mod study;
pub mod workflow;

pub use hooks::{ExitIteration, IterationVerdict, NeverExit, NoopSetup, Setup};
pub use iterative::{IterationStop, IterativeWorkflow};
pub use snapshot::{SNAPSHOT_FNAME, TaskSnapshot, WorkflowSnapshot};
pub use study::{ConvergenceStudy, DEFAULT_MONOTONIC_TOL, Series};
pub use workflow::{Fetch, SubmitPolicy, TaskOptions, Workflow};
