// src/dag/status.rs

//! Task lifecycle states.
//!
//! The happy path is totally ordered:
//!
//! `Init < Ready < Submitted < Running < Done < Ok`
//!
//! `Error` and `Cancelled` form a terminal failure branch. They compare
//! greater than every in-flight state (`Init..=Running`) but are incomparable
//! with `Done`, `Ok` and each other, so `partial_cmp` returns `None` for
//! those pairs instead of silently ordering them.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered, waiting for its dependencies.
    Init,
    /// All dependencies are satisfied; eligible to start.
    Ready,
    /// Handed to the resource manager but not yet running.
    Submitted,
    /// The external process is running.
    Running,
    /// The process finished; outputs not validated yet.
    Done,
    /// Finished and validated.
    Ok,
    /// Finished with a failure (non-zero exit, missing outputs, spawn error).
    Error,
    /// Abandoned before completion.
    Cancelled,
}

impl TaskStatus {
    /// Position on the happy path, `None` for the failure branch.
    fn happy_rank(self) -> Option<u8> {
        match self {
            TaskStatus::Init => Some(0),
            TaskStatus::Ready => Some(1),
            TaskStatus::Submitted => Some(2),
            TaskStatus::Running => Some(3),
            TaskStatus::Done => Some(4),
            TaskStatus::Ok => Some(5),
            TaskStatus::Error | TaskStatus::Cancelled => None,
        }
    }

    /// Coarse progress used when a single "least advanced" status is needed.
    ///
    /// The failure branch ranks with `Done`: finished, but not successfully.
    pub fn progress(self) -> u8 {
        self.happy_rank().unwrap_or(4)
    }

    /// `true` if `self` is strictly before `other` in the partial order.
    pub fn is_before(self, other: TaskStatus) -> bool {
        matches!(self.partial_cmp(&other), Some(Ordering::Less))
    }

    /// The task will not change state again on its own.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Ok | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Terminal in the sense of the scheduler: no further transitions.
    ///
    /// `Done` is finished but still awaits validation into `Ok`/`Error`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Ok | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    pub fn is_ok(self) -> bool {
        self == TaskStatus::Ok
    }

    pub fn is_failed(self) -> bool {
        matches!(self, TaskStatus::Error | TaskStatus::Cancelled)
    }

    /// Eligible to be started by the scheduler.
    pub fn is_runnable(self) -> bool {
        self == TaskStatus::Ready
    }

    /// Holding CPUs (queued or running).
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Submitted | TaskStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Init => "Initialized",
            TaskStatus::Ready => "Ready",
            TaskStatus::Submitted => "Submitted",
            TaskStatus::Running => "Running",
            TaskStatus::Done => "Done",
            TaskStatus::Ok => "Completed",
            TaskStatus::Error => "Error",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}

impl PartialOrd for TaskStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.happy_rank(), other.happy_rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            // Failure branch vs. happy path: only in-flight states are below it.
            (None, Some(b)) if b < 4 => Some(Ordering::Greater),
            (Some(a), None) if a < 4 => Some(Ordering::Less),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
