// src/dag/graph.rs

use std::collections::BTreeMap;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Walker};
use petgraph::Direction;

use crate::dag::TaskId;
use crate::dag::link::Link;

/// Producer → consumer graph derived from a workflow's links.
///
/// The workflow already guarantees acyclicity (links only point backwards),
/// so this is only used for diagnostics: who depends on whom, and which
/// tasks can never run because something upstream failed.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraphMap<TaskId, ()>,
}

impl DependencyGraph {
    pub fn from_links(num_tasks: usize, links: &BTreeMap<TaskId, Vec<Link>>) -> Self {
        let mut graph = DiGraphMap::new();
        for id in 0..num_tasks {
            graph.add_node(id);
        }
        for (consumer, task_links) in links {
            for link in task_links {
                graph.add_edge(link.producer(), *consumer, ());
            }
        }
        Self { graph }
    }

    /// Direct producers of `id`, ascending.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(id, Direction::Incoming)
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Direct consumers of `id`, ascending.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Every task transitively downstream of `id` (excluding `id`).
    pub fn downstream_of(&self, id: TaskId) -> Vec<TaskId> {
        if !self.graph.contains_node(id) {
            return Vec::new();
        }
        let mut out: Vec<_> = Bfs::new(&self.graph, id)
            .iter(&self.graph)
            .filter(|n| *n != id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Tasks that can never become ready because a failed task is upstream.
    ///
    /// Returns `(blocked, failed_root)` pairs; a task blocked by several
    /// failures is reported once, against the lowest failed id.
    pub fn blocked_by(&self, failed: &[TaskId]) -> Vec<(TaskId, TaskId)> {
        let mut blocked: BTreeMap<TaskId, TaskId> = BTreeMap::new();
        for &root in failed {
            for id in self.downstream_of(root) {
                blocked.entry(id).or_insert(root);
            }
        }
        blocked.into_iter().collect()
    }
}
