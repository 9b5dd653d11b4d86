// src/job/generator.rs

//! Pull-based sources of job specifications for iterative workflows.

use std::collections::VecDeque;

use serde_json::Value;

use crate::job::spec::JobSpec;

/// Result of pulling from a [`JobGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// A new job to register.
    Job(JobSpec),
    /// Nothing to hand out right now; asking again later may yield a job.
    Paused,
    /// The generator will never produce another job.
    Exhausted,
}

/// Lazily produces job specifications, one per pull.
pub trait JobGenerator: Send {
    fn next_job(&mut self) -> Next;
}

/// Adapts any iterator of job specs. Exhaustion is final: once the iterator
/// returns `None` it is never polled again.
pub struct FromIter<I> {
    iter: Option<I>,
}

impl<I> FromIter<I> {
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I> JobGenerator for FromIter<I>
where
    I: Iterator<Item = JobSpec> + Send,
{
    fn next_job(&mut self) -> Next {
        match self.iter.as_mut().and_then(Iterator::next) {
            Some(job) => Next::Job(job),
            None => {
                self.iter = None;
                Next::Exhausted
            }
        }
    }
}

/// Job queue that can be refilled from outside; empty means paused until
/// [`JobQueue::close`] is called.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<JobSpec>,
    closed: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: JobSpec) {
        self.jobs.push_back(job);
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl JobGenerator for JobQueue {
    fn next_job(&mut self) -> Next {
        match self.jobs.pop_front() {
            Some(job) => Next::Job(job),
            None if self.closed => Next::Exhausted,
            None => Next::Paused,
        }
    }
}

/// Values taken by the swept parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepValues {
    /// An explicit, finite list.
    List(Vec<f64>),
    /// `start, start + step, ...` up to `stop` (inclusive) or forever.
    Range {
        start: f64,
        step: f64,
        stop: Option<f64>,
    },
}

/// Generates copies of a template job with one input variable swept.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    template: JobSpec,
    param: String,
    values: SweepValues,
    index: usize,
}

impl ParamSweep {
    pub fn new(template: JobSpec, param: impl Into<String>, values: SweepValues) -> Self {
        Self {
            template,
            param: param.into(),
            values,
            index: 0,
        }
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    /// The job that would be produced for `value`.
    pub fn job_with(&self, value: f64) -> JobSpec {
        let mut job = self.template.clone();
        let vars = match &mut job {
            JobSpec::Strategy(s) => &mut s.vars,
            JobSpec::Input(i) => &mut i.vars,
        };
        vars.insert(self.param.clone(), Value::from(value));
        job
    }

    fn value_at(&self, index: usize) -> Option<f64> {
        match &self.values {
            SweepValues::List(values) => values.get(index).copied(),
            SweepValues::Range { start, step, stop } => {
                let value = start + step * index as f64;
                match stop {
                    Some(stop) if (*step >= 0.0 && value > *stop) || (*step < 0.0 && value < *stop) => {
                        None
                    }
                    _ => Some(value),
                }
            }
        }
    }
}

impl JobGenerator for ParamSweep {
    fn next_job(&mut self) -> Next {
        match self.value_at(self.index) {
            Some(value) => {
                self.index += 1;
                Next::Job(self.job_with(value))
            }
            None => Next::Exhausted,
        }
    }
}
