use super::{
    BasicBlockScheduler, SchedulingAdapter, SchedulingConstraints, adapter::span_end,
};
use hls_utils::{Error, HlsResult};

/// Earliest start of `task` given its scheduled predecessors. Fails when a
/// predecessor in the block is still unplaced or a maximum delay cannot be
/// met at `not_before`.
fn earliest_after<A: SchedulingAdapter>(
    adapter: &A,
    task: A::Task,
    members: &[A::Task],
    not_before: i64,
) -> HlsResult<i64> {
    let mut time = not_before;
    for dep in adapter.preds(task) {
        match adapter.cstep(dep.task) {
            Some(c) => time = time.max(c + dep.min_delay),
            None if members.contains(&dep.task) => {
                return Err(Error::infeasible(format!(
                    "{task:?} precedes its predecessor {:?}",
                    dep.task
                )));
            }
            None => {}
        }
    }
    if let Some(dep) = adapter
        .preds(task)
        .iter()
        .find(|d| adapter.cstep(d.task).is_some_and(|c| !d.admits(c, time)))
    {
        return Err(Error::infeasible(format!(
            "{task:?} cannot start within {} c-steps of {:?}",
            dep.max_delay, dep.task
        )));
    }
    Ok(time)
}

/// Executes the tasks strictly one after another in the given order.
#[derive(Default, Clone, Copy, Debug)]
pub struct SequentialScheduler;

impl BasicBlockScheduler for SequentialScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        let start = constraints.start_time;
        let mut now = start;
        for task in tasks {
            let time = earliest_after(adapter, *task, tasks, now)?;
            adapter.set_cstep(*task, time);
            now = time + adapter.latency(*task).max(1);
        }
        let end = span_end(adapter, tasks, start);
        if let Some(bound) = constraints.end_time.filter(|b| end > *b) {
            return Err(Error::infeasible(format!(
                "sequential schedule ends in c-step {end}, window ends in c-step {bound}"
            )));
        }
        constraints.end_time = Some(end);
        Ok(())
    }
}

/// Issues exactly one task per c-step, in the given order. Tasks may overlap
/// when latencies exceed one c-step.
#[derive(Default, Clone, Copy, Debug)]
pub struct OneInstructionPerCStepScheduler;

impl BasicBlockScheduler for OneInstructionPerCStepScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        let start = constraints.start_time;
        let mut next = start;
        for task in tasks {
            let time = earliest_after(adapter, *task, tasks, next)?;
            adapter.set_cstep(*task, time);
            next = time + 1;
        }
        let end = span_end(adapter, tasks, start);
        if let Some(bound) = constraints.end_time.filter(|b| end > *b) {
            return Err(Error::infeasible(format!(
                "schedule ends in c-step {end}, window ends in c-step {bound}"
            )));
        }
        constraints.end_time = Some(end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::TaskGraph;

    fn diamond() -> (TaskGraph<&'static str>, Vec<crate::schedule::TaskId>) {
        let mut g = TaskGraph::new();
        let a = g.add_task(2, "mul");
        let b = g.add_task(0, "wire");
        let c = g.add_task(1, "alu");
        g.depend(a, c);
        g.depend(b, c);
        let tasks = g.tasks().collect();
        (g, tasks)
    }

    #[test]
    fn sequential_order() {
        let (mut g, tasks) = diamond();
        let mut constraints = SchedulingConstraints::default();
        SequentialScheduler
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(0), Some(2), Some(3)]
        );
        assert_eq!(constraints.end_time, Some(4));
    }

    #[test]
    fn one_per_cstep() {
        let (mut g, tasks) = diamond();
        let mut constraints = SchedulingConstraints::default();
        OneInstructionPerCStepScheduler
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
        assert_eq!(constraints.end_time, Some(3));
    }

    #[test]
    fn predecessor_out_of_order() {
        let (mut g, mut tasks) = diamond();
        tasks.reverse();
        let err = OneInstructionPerCStepScheduler
            .schedule(&tasks, &mut g, &mut SchedulingConstraints::default())
            .unwrap_err();
        assert!(err.is_infeasible());
    }
}
