use super::{
    AsapScheduler, AslapAdapter, BasicBlockScheduler, PinResult, SchedulingAdapter,
    SchedulingConstraints, adapter::span_end,
};
use hls_utils::{Error, HlsResult, PriorityQueue};
use std::collections::{BTreeSet, HashSet};

/// Places every task at the latest c-step that still lets it complete before
/// the end of the window. Without an end bound, the end of the ASAP schedule
/// is used.
#[derive(Default, Clone, Copy, Debug)]
pub struct AlapScheduler {
    pub constrained: bool,
}

impl AlapScheduler {
    pub fn constrained() -> Self {
        Self { constrained: true }
    }
}

impl BasicBlockScheduler for AlapScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        let start = constraints.start_time;
        let end = match constraints.end_time {
            Some(end) => end,
            None => {
                let mut overlay = AslapAdapter::new(&*adapter);
                let mut local = constraints.starting_at(start);
                AsapScheduler::default().schedule(tasks, &mut overlay, &mut local)?;
                local.end_time.unwrap_or(start)
            }
        };

        let members: HashSet<A::Task> = tasks.iter().copied().collect();
        // Keys are negated c-steps so that the latest time is served first.
        let mut queue = PriorityQueue::with_resolver(
            |mut a: BTreeSet<A::Task>, b: BTreeSet<A::Task>| {
                a.extend(b);
                a
            },
        );
        if !tasks.is_empty() {
            queue.enqueue(-(end - 1), tasks.iter().copied().collect())?;
        }

        while let Ok((key, ready)) = queue.dequeue() {
            let now = -key;
            for task in ready {
                if adapter.cstep(task).is_some() {
                    continue;
                }
                let mut latest = end - adapter.latency(task).max(1);
                let mut waiting = false;
                for dep in adapter.succs(task) {
                    match adapter.cstep(dep.task) {
                        Some(c) => latest = latest.min(c - dep.min_delay),
                        None => waiting |= members.contains(&dep.task),
                    }
                }
                if waiting {
                    continue;
                }
                if latest < now {
                    queue.enqueue(-latest, BTreeSet::from([task]))?;
                    continue;
                }
                if now < start {
                    return Err(Error::infeasible(format!(
                        "{task:?} would start before c-step {start}"
                    )));
                }
                if let Some(dep) = adapter.succs(task).iter().find(|d| {
                    adapter.cstep(d.task).is_some_and(|c| !d.admits(now, c))
                }) {
                    return Err(Error::infeasible(format!(
                        "{:?} cannot start within {} c-steps of {task:?}",
                        dep.task, dep.max_delay
                    )));
                }
                if self.constrained {
                    if let PinResult::Blocked { pre_hint, .. } = adapter.try_pin(task, now) {
                        let pre = pre_hint.min(now - 1);
                        if pre < start {
                            return Err(Error::infeasible(format!(
                                "no free unit for {task:?} before c-step {now}"
                            )));
                        }
                        queue.enqueue(-pre, BTreeSet::from([task]))?;
                        continue;
                    }
                }
                adapter.set_cstep(task, now);
                for dep in adapter.preds(task) {
                    if members.contains(&dep.task) {
                        queue.enqueue(-(now - dep.min_delay), BTreeSet::from([dep.task]))?;
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
    fn tasks_move_towards_the_end() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.depend(a, c);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::window(0, 6);
        AlapScheduler::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(4), Some(5), Some(5)]
        );
        assert_eq!(constraints.end_time, Some(6));
        check_schedule(&g, &tasks).unwrap();
    }

    #[test]
    fn end_defaults_to_critical_path() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(2, "mul");
        g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.depend(a, c);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        AlapScheduler::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(0), Some(2), Some(2)]
        );
        assert_eq!(constraints.end_time, Some(3));
    }

    #[test]
    fn window_too_small() {
        let mut g: TaskGraph<&str> = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        g.depend(a, b);
        let tasks: Vec<_> = g.tasks().collect();
        let err = AlapScheduler::default()
            .schedule(&tasks, &mut g, &mut SchedulingConstraints::window(0, 1))
            .unwrap_err();
        assert!(err.is_infeasible());
    }
}
