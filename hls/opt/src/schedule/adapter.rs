use super::SchedulingConstraints;
use hls_utils::{Error, HlsResult};
use std::{fmt::Debug, hash::Hash};

/// Stands for an unbounded maximum delay. Window arithmetic involving it
/// saturates.
pub const UNBOUNDED: i64 = i32::MAX as i64;

/// Timing constraint towards a neighboring task. Stored in the predecessor
/// list of a task, `task` is the predecessor; in the successor list, the
/// successor. Either way the successor must start between `min_delay` and
/// `max_delay` c-steps after the predecessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleDependency<T> {
    pub task: T,
    pub min_delay: i64,
    pub max_delay: i64,
}

impl<T> ScheduleDependency<T> {
    pub fn new(task: T, min_delay: i64, max_delay: i64) -> Self {
        assert!(
            0 <= min_delay && min_delay <= max_delay,
            "invalid delay window [{min_delay}, {max_delay}]"
        );
        Self {
            task,
            min_delay,
            max_delay,
        }
    }

    /// An ordinary data dependency: at least `min_delay`, no upper bound.
    pub fn after(task: T, min_delay: i64) -> Self {
        Self::new(task, min_delay, UNBOUNDED)
    }

    pub fn is_bounded(&self) -> bool {
        self.max_delay < UNBOUNDED
    }

    /// Whether the predecessor at `from` and the successor at `to` satisfy
    /// the constraint.
    pub fn admits(&self, from: i64, to: i64) -> bool {
        let distance = to - from;
        distance >= self.min_delay && (!self.is_bounded() || distance <= self.max_delay)
    }

    /// The same constraint pointing at `task`.
    pub fn with_task<U>(&self, task: U) -> ScheduleDependency<U> {
        ScheduleDependency {
            task,
            min_delay: self.min_delay,
            max_delay: self.max_delay,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinResult {
    /// The task may execute at the requested c-step; the resources it needs
    /// there are now held.
    Pinned,
    /// Resources are exhausted at the requested c-step. The hints are the
    /// closest earlier and later c-steps where they are not.
    Blocked { pre_hint: i64, post_hint: i64 },
}

/// What a scheduling algorithm needs to know about the tasks it schedules.
pub trait SchedulingAdapter {
    type Task: Copy + Eq + Hash + Ord + Debug;
    /// Tasks of equal class compete for the same pool of units.
    type Class: Clone + Eq + Hash + Ord + Debug;

    fn index(&self, task: Self::Task) -> usize;
    fn preds(&self, task: Self::Task) -> &[ScheduleDependency<Self::Task>];
    fn succs(&self, task: Self::Task) -> &[ScheduleDependency<Self::Task>];
    fn operands(&self, task: Self::Task) -> &[usize];
    fn results(&self, task: Self::Task) -> &[usize];
    fn latency(&self, task: Self::Task) -> i64;
    /// `None` until the task is scheduled.
    fn cstep(&self, task: Self::Task) -> Option<i64>;
    fn set_cstep(&mut self, task: Self::Task, cstep: i64);
    fn iclass(&self, task: Self::Task) -> Self::Class;
    /// Tries to acquire the resources `task` needs when issued at `cstep`.
    fn try_pin(&mut self, task: Self::Task, cstep: i64) -> PinResult;
    /// Forgets all c-steps and held resources.
    fn clear_schedule(&mut self);
}

/// An algorithm assigning c-steps to the tasks of one basic block.
///
/// On entry the tasks are unscheduled. On success every task has a c-step not
/// before `constraints.start_time`, and `constraints.end_time` holds the
/// largest [task_end] of the block. With a hard end bound, a task is admitted
/// only if its [task_end] does not exceed the bound.
pub trait BasicBlockScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()>;
}

/// C-step in which `task`, issued at `cstep`, delivers its result.
pub fn completion<A: SchedulingAdapter>(adapter: &A, task: A::Task, cstep: i64) -> i64 {
    cstep + adapter.latency(task).max(0)
}

/// First c-step no longer occupied by `task` issued at `cstep`. A task holds
/// at least the c-step it is issued in, zero-latency tasks included.
pub fn task_end<A: SchedulingAdapter>(adapter: &A, task: A::Task, cstep: i64) -> i64 {
    cstep + adapter.latency(task).max(1)
}

/// Largest [task_end] over the scheduled tasks in `tasks`.
pub(super) fn span_end<A: SchedulingAdapter>(adapter: &A, tasks: &[A::Task], start: i64) -> i64 {
    tasks
        .iter()
        .filter_map(|t| adapter.cstep(*t).map(|c| task_end(adapter, *t, c)))
        .fold(start, i64::max)
}

/// Verifies that every task is scheduled and that every dependency between
/// scheduled tasks holds.
pub fn check_schedule<A: SchedulingAdapter>(adapter: &A, tasks: &[A::Task]) -> HlsResult<()> {
    for task in tasks {
        let Some(cstep) = adapter.cstep(*task) else {
            return Err(Error::infeasible(format!("{task:?} is unscheduled")));
        };
        for dep in adapter.preds(*task) {
            if let Some(pred) = adapter.cstep(dep.task) {
                if !dep.admits(pred, cstep) {
                    return Err(Error::infeasible(format!(
                        "{task:?} at c-step {cstep} violates [{}, {}] after {:?} at c-step {pred}",
                        dep.min_delay, dep.max_delay, dep.task
                    )));
                }
            }
        }
    }
    Ok(())
}
