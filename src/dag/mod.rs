// src/dag/mod.rs

//! Dependency model.
//!
//! - [`status`] holds the task lifecycle states and their partial order.
//! - [`product`] describes the files a task promises to produce.
//! - [`link`] is a dependency edge: a producer plus the products a consumer needs.
//! - [`graph`] is a petgraph view of the links, used for diagnostics.

pub mod graph;
pub mod link;
pub mod product;
pub mod status;

/// Task identifier: the registration index inside its workflow.
pub type TaskId = usize;

pub use graph::DependencyGraph;
pub use link::Link;
pub use product::{ConfigFragment, Product, config_for_ext, normalize_ext};
pub use status::TaskStatus;
