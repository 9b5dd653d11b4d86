// src/job/mod.rs

//! Job specifications and the generators that feed iterative workflows.

pub mod generator;
pub mod spec;

pub use generator::{FromIter, JobGenerator, JobQueue, Next, ParamSweep, SweepValues};
pub use spec::{InputVars, JobInput, JobSpec, Strategy};
