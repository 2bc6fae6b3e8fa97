use super::{
    BasicBlockScheduler, PinResult, SchedulingAdapter, SchedulingConstraints, TimeFrames,
    adapter::{span_end, task_end},
};
use hls_utils::{Error, HlsResult, PriorityQueue};
use std::{
    collections::{BTreeSet, HashSet},
    hash::Hash,
};

/// Ranks ready tasks. Lower keys are served first.
pub trait PriorityPolicy {
    fn key<T: Copy + Eq + Hash>(&self, task: T, index: usize, frames: &TimeFrames<T>) -> i64;
}

/// Least slack first: tasks on the critical path are placed before the
/// others.
#[derive(Default, Clone, Copy, Debug)]
pub struct MobilityPriority;

impl PriorityPolicy for MobilityPriority {
    fn key<T: Copy + Eq + Hash>(&self, task: T, _index: usize, frames: &TimeFrames<T>) -> i64 {
        frames.mobility(task)
    }
}

#[derive(Default, Clone, Copy, Debug)]
pub struct AsapPriority;

impl PriorityPolicy for AsapPriority {
    fn key<T: Copy + Eq + Hash>(&self, task: T, _index: usize, frames: &TimeFrames<T>) -> i64 {
        frames.asap(task)
    }
}

/// Program order.
#[derive(Default, Clone, Copy, Debug)]
pub struct IndexPriority;

impl PriorityPolicy for IndexPriority {
    fn key<T: Copy + Eq + Hash>(&self, _task: T, index: usize, _frames: &TimeFrames<T>) -> i64 {
        index as i64
    }
}

/// Resource-constrained list scheduling.
///
/// Ready tasks wait in a priority queue keyed by the c-step in which their
/// predecessors are placed and their minimum delays have elapsed. Each set
/// taken from the queue is sorted by the policy key, then by instruction class
/// and index, and pinned one after another. A task that finds no free unit
/// moves on to the next c-step. Tasks that become ready through zero-delay
/// edges are placed in the same c-step.
#[derive(Default, Clone, Copy, Debug)]
pub struct ListScheduler<P: PriorityPolicy = MobilityPriority> {
    pub policy: P,
}

impl<P: PriorityPolicy> ListScheduler<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }
}

impl<P: PriorityPolicy> BasicBlockScheduler for ListScheduler<P> {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        let start = constraints.start_time;
        let frames = TimeFrames::compute(tasks, &*adapter, constraints)?;
        let members: HashSet<A::Task> = tasks.iter().copied().collect();
        let horizon = match constraints.end_time {
            Some(bound) => bound,
            None => {
                let slack: i64 = tasks
                    .iter()
                    .map(|t| {
                        adapter.latency(*t).max(1)
                            + adapter
                                .preds(*t)
                                .iter()
                                .map(|d| d.min_delay.max(0))
                                .sum::<i64>()
                    })
                    .sum();
                frames.alap_end + slack + 1
            }
        };
        log::debug!(
            "list scheduling {} tasks from c-step {start}, asap end {}, alap end {}, horizon {horizon}",
            tasks.len(),
            frames.asap_end,
            frames.alap_end
        );

        // Ready sets keyed by the c-step they are released in. Tasks released
        // through zero-delay edges land in a fresh set for the current c-step.
        let mut queue = PriorityQueue::with_resolver(
            |mut a: BTreeSet<A::Task>, b: BTreeSet<A::Task>| {
                a.extend(b);
                a
            },
        );
        if !tasks.is_empty() {
            queue.enqueue(start, tasks.iter().copied().collect())?;
        }

        while let Ok((now, released)) = queue.dequeue() {
            let mut ready = Vec::with_capacity(released.len());
            for task in released {
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
                if waiting {
                    continue;
                }
                if earliest > now {
                    queue.enqueue(earliest, BTreeSet::from([task]))?;
                    continue;
                }
                let index = adapter.index(task);
                let key = self.policy.key(task, index, &frames);
                ready.push((key, adapter.iclass(task), index, task));
            }
            if ready.is_empty() {
                continue;
            }
            if now >= horizon {
                return Err(Error::infeasible(format!(
                    "{} tasks left when the window closed at c-step {horizon}",
                    ready.len()
                )));
            }
            ready.sort();

            for (_, _, _, task) in ready {
                if let Some(dep) = adapter.preds(task).iter().find(|d| {
                    adapter.cstep(d.task).is_some_and(|c| !d.admits(c, now))
                }) {
                    return Err(Error::infeasible(format!(
                        "{task:?} missed its deadline of {} c-steps after {:?}",
                        dep.max_delay, dep.task
                    )));
                }
                if task_end(adapter, task, now) > horizon {
                    return Err(Error::infeasible(format!(
                        "{task:?} does not complete before c-step {horizon}"
                    )));
                }
                if adapter.try_pin(task, now) != PinResult::Pinned {
                    queue.enqueue(now + 1, BTreeSet::from([task]))?;
                    continue;
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
