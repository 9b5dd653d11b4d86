// src/engine/study.rs

//! Convergence study: the exit criterion of a parameter sweep.
//!
//! After every task, the swept parameter is read from each task's job and
//! the studied quantity from each task's output; [`compute_hints`] decides
//! whether the high-accuracy tier has converged.

use tracing::{debug, warn};

use crate::convergence::{ConvergenceHints, Direction, ToleranceTiers, compute_hints, monotonic};
use crate::engine::hooks::{ExitIteration, IterationVerdict};
use crate::engine::workflow::Workflow;
use crate::errors::Result;
use crate::exec::Scalar;
use crate::results::WorkflowResults;

/// Tolerance under which two consecutive values count as equal when
/// checking that the series decreases.
pub const DEFAULT_MONOTONIC_TOL: f64 = 1.0e-5;

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceStudy {
    param: String,
    quantity: String,
    ext: String,
    tiers: ToleranceTiers,
    min_points: usize,
    monotonic_tol: f64,
}

/// Points of the sweep that could be read, plus what could not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub params: Vec<f64>,
    pub values: Vec<f64>,
    pub problems: Vec<String>,
}

impl ConvergenceStudy {
    pub fn new(
        param: impl Into<String>,
        quantity: impl Into<String>,
        ext: impl Into<String>,
        tiers: ToleranceTiers,
    ) -> Self {
        Self {
            param: param.into(),
            quantity: quantity.into(),
            ext: ext.into(),
            tiers,
            min_points: 1,
            monotonic_tol: DEFAULT_MONOTONIC_TOL,
        }
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    pub fn with_monotonic_tol(mut self, tol: f64) -> Self {
        self.monotonic_tol = tol;
        self
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn quantity(&self) -> &str {
        &self.quantity
    }

    /// Collect `(param, quantity)` for every task. Tasks whose parameter or
    /// quantity cannot be read are left out and reported in `problems`.
    pub fn series(&self, workflow: &Workflow) -> Result<Series> {
        let scalars = workflow.read_scalar(&self.ext, &self.quantity)?;
        let mut series = Series::default();

        for (task, scalar) in workflow.tasks().zip(scalars) {
            let Some(param) = task.spec().param(&self.param) else {
                series.problems.push(format!(
                    "task {} has no numeric '{}' variable",
                    task.name(),
                    self.param
                ));
                continue;
            };
            match scalar {
                Scalar::Finite(value) => {
                    series.params.push(param);
                    series.values.push(value);
                }
                Scalar::Unreadable(reason) => series.problems.push(format!(
                    "cannot read {} of task {}: {reason}",
                    self.quantity,
                    task.name()
                )),
            }
        }
        Ok(series)
    }

    pub fn hints(&self, workflow: &Workflow) -> Result<(ConvergenceHints, Series)> {
        let series = self.series(workflow)?;
        let hints = compute_hints(&series.params, &series.values, &self.tiers, self.min_points)?;
        Ok((hints, series))
    }
}

impl ExitIteration for ConvergenceStudy {
    fn exit_iteration(&mut self, workflow: &Workflow) -> Result<IterationVerdict> {
        let (hints, series) = self.hints(workflow)?;
        for problem in &series.problems {
            warn!(quantity = %self.quantity, %problem, "point left out of the convergence check");
        }
        debug!(
            param = %self.param,
            points = series.values.len(),
            exit = hints.exit,
            "convergence check"
        );
        Ok(IterationVerdict {
            exit: hints.exit,
            data: hints.to_data()?,
        })
    }

    fn decorate_results(&self, workflow: &Workflow, results: &mut WorkflowResults) -> Result<()> {
        let (hints, series) = self.hints(workflow)?;
        results.push_exceptions(series.problems);
        results.update(hints.to_data()?);

        if !monotonic(&series.values, Direction::Decreasing, self.monotonic_tol) {
            warn!(quantity = %self.quantity, "series is not decreasing");
            results.push_exception(format!(
                "{} is not decreasing: {:?}",
                self.quantity, series.values
            ));
        }
        Ok(())
    }
}
