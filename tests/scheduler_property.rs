// tests/scheduler_property.rs

mod common;
use crate::common::{FakeEnv, fake_job};

use std::collections::BTreeSet;

use proptest::prelude::*;
use simflow::dag::TaskStatus;
use simflow::engine::{Fetch, Workflow};

const FORCED: [TaskStatus; 5] = [
    TaskStatus::Init,
    TaskStatus::Ready,
    TaskStatus::Ok,
    TaskStatus::Error,
    TaskStatus::Cancelled,
];

// Task N may only depend on tasks 0..N, which keeps every generated graph
// acyclic, same as registration does.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..4),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn build(env: &FakeEnv, deps: &[BTreeSet<usize>]) -> Workflow {
    let mut wf = env.workflow();
    for producers in deps {
        let links = producers
            .iter()
            .map(|&p| wf.register_link(p, &[]).unwrap())
            .collect();
        wf.register(fake_job("run", &[]), links).unwrap();
    }
    wf
}

proptest! {
    #[test]
    fn waiting_task_is_ready_iff_producers_ok(
        deps in dag_strategy(12),
        picks in proptest::collection::vec(0..FORCED.len(), 12),
    ) {
        let env = FakeEnv::new();
        let mut wf = build(&env, &deps);
        let forced: Vec<TaskStatus> = (0..deps.len()).map(|i| FORCED[picks[i]]).collect();
        for (id, status) in forced.iter().enumerate() {
            wf.task_mut(id).unwrap().set_status(*status);
        }

        wf.check_status().unwrap();

        for (id, producers) in deps.iter().enumerate() {
            let now = wf.task(id).unwrap().status();
            if forced[id] == TaskStatus::Init {
                let expected = if producers.iter().all(|&p| forced[p] == TaskStatus::Ok) {
                    TaskStatus::Ready
                } else {
                    TaskStatus::Init
                };
                prop_assert_eq!(now, expected, "task {}", id);
            } else {
                prop_assert_eq!(now, forced[id], "task {}", id);
            }
        }
    }

    #[test]
    fn fetch_never_returns_a_task_with_unfinished_producers(
        deps in dag_strategy(10),
        picks in proptest::collection::vec(0..FORCED.len(), 10),
    ) {
        let env = FakeEnv::new();
        let mut wf = build(&env, &deps);
        for id in 0..deps.len() {
            wf.task_mut(id).unwrap().set_status(FORCED[picks[id]]);
        }

        match wf.fetch_task_to_run().unwrap() {
            Fetch::Task(id) => {
                prop_assert!(wf.can_run(id).unwrap());
                for &p in &deps[id] {
                    prop_assert_eq!(wf.task(p).unwrap().status(), TaskStatus::Ok);
                }
                // It is the first runnable one.
                for earlier in 0..id {
                    prop_assert!(!wf.can_run(earlier).unwrap());
                }
            }
            Fetch::Exhausted => prop_assert!(wf.all_done()),
            Fetch::Unavailable => {
                prop_assert!(!wf.all_done());
                prop_assert!((0..deps.len()).all(|id| !wf.can_run(id).unwrap()));
            }
        }
    }
}
