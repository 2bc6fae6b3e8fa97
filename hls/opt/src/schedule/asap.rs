use super::{
    BasicBlockScheduler, PinResult, SchedulingAdapter, SchedulingConstraints,
    adapter::{span_end, task_end},
};
use hls_utils::{Error, HlsResult, PriorityQueue};
use std::collections::{BTreeSet, HashSet};

/// Places every task at the earliest c-step its predecessors allow.
///
/// When `constrained` is set, resources are acquired through
/// [SchedulingAdapter::try_pin] and blocked tasks move to the hinted later
/// c-step.
#[derive(Default, Clone, Copy, Debug)]
pub struct AsapScheduler {
    pub constrained: bool,
}

impl AsapScheduler {
    pub fn constrained() -> Self {
        Self { constrained: true }
    }
}

impl BasicBlockScheduler for AsapScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        let start = constraints.start_time;
        let members: HashSet<A::Task> = tasks.iter().copied().collect();
        let mut queue = PriorityQueue::with_resolver(
            |mut a: BTreeSet<A::Task>, b: BTreeSet<A::Task>| {
                a.extend(b);
                a
            },
        );
        if !tasks.is_empty() {
            queue.enqueue(start, tasks.iter().copied().collect())?;
        }

        while let Ok((now, ready)) = queue.dequeue() {
            for task in ready {
                if adapter.cstep(task).is_some() {
                    continue;
                }
                let mut earliest = start;
                let mut waiting = false;
                for dep in adapter.preds(task) {
                    match adapter.cstep(dep.task) {
                        Some(c) => earliest = earliest.max(c + dep.min_delay),
                        None => waiting |= members.contains(&dep.task),
                    }
                }
                // Re-enqueued once the last predecessor is placed.
                if waiting {
                    continue;
                }
                if earliest > now {
                    queue.enqueue(earliest, BTreeSet::from([task]))?;
                    continue;
                }
                if let Some(dep) = adapter.preds(task).iter().find(|d| {
                    adapter.cstep(d.task).is_some_and(|c| !d.admits(c, now))
                }) {
                    return Err(Error::infeasible(format!(
                        "{task:?} cannot start within {} c-steps of {:?}",
                        dep.max_delay, dep.task
                    )));
                }
                if let Some(bound) = constraints.end_time {
                    if task_end(adapter, task, now) > bound {
                        return Err(Error::infeasible(format!(
                            "{task:?} does not fit before c-step {bound}"
                        )));
                    }
                }
                if self.constrained {
                    if let PinResult::Blocked { post_hint, .. } = adapter.try_pin(task, now) {
                        queue.enqueue(post_hint.max(now + 1), BTreeSet::from([task]))?;
                        continue;
                    }
                }
                adapter.set_cstep(task, now);
                for dep in adapter.succs(task) {
                    if members.contains(&dep.task) {
                        queue.enqueue(now + dep.min_delay, BTreeSet::from([dep.task]))?;
                    }
                }
            }
        }

        if let Some(task) = tasks.iter().find(|t| adapter.cstep(**t).is_none()) {
            return Err(Error::infeasible(format!(
                "dependency cycle through {task:?}"
            )));
        }
        constraints.end_time = Some(span_end(adapter, tasks, start));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{TaskGraph, check_schedule};

    #[test]
    fn chains_follow_latencies() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(2, "mul");
        let b = g.add_task(1, "add");
        let c = g.add_task(1, "add");
        g.depend(a, b);
        g.depend(b, c);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        AsapScheduler::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(0), Some(2), Some(3)]
        );
        assert_eq!(constraints.end_time, Some(4));
        check_schedule(&g, &tasks).unwrap();
    }

    #[test]
    fn zero_delay_chains_share_a_cstep() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(0, "wire");
        let b = g.add_task(0, "wire");
        g.depend(a, b);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::window(3, 10);
        AsapScheduler::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!((g.cstep(a), g.cstep(b)), (Some(3), Some(3)));
        assert_eq!(constraints.end_time, Some(4));
    }

    #[test]
    fn constrained_tasks_wait_for_units() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        g.set_limit("alu", 1);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        AsapScheduler::constrained()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!((g.cstep(a), g.cstep(b)), (Some(0), Some(1)));
    }

    #[test]
    fn max_delay_violation_is_infeasible() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(3, "mul");
        let c = g.add_task(1, "alu");
        g.depend(b, c);
        g.add_dependency(a, c, 0, 1);
        let tasks: Vec<_> = g.tasks().collect();
        let err = AsapScheduler::default()
            .schedule(&tasks, &mut g, &mut SchedulingConstraints::default())
            .unwrap_err();
        assert!(err.is_infeasible());
    }
}
