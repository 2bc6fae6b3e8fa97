use super::{PinResult, ScheduleDependency, SchedulingAdapter, UNBOUNDED};
use crate::alloc::ReservationTable;
use std::{collections::HashMap, fmt::Debug, hash::Hash};

/// Handle of a task inside a [TaskGraph].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

#[derive(Clone, Debug)]
struct TaskNode<C> {
    latency: i64,
    class: C,
    preds: Vec<ScheduleDependency<TaskId>>,
    succs: Vec<ScheduleDependency<TaskId>>,
    operands: Vec<usize>,
    results: Vec<usize>,
}

/// A self-contained task set. Classes with a limit share a pool of at most
/// that many units, each with its own reservation table; classes without a
/// limit never block.
#[derive(Clone, Debug)]
pub struct TaskGraph<C> {
    nodes: Vec<TaskNode<C>>,
    csteps: Vec<Option<i64>>,
    limits: HashMap<C, usize>,
    pools: HashMap<C, Vec<ReservationTable<TaskId>>>,
}

impl<C> Default for TaskGraph<C> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            csteps: Vec::new(),
            limits: HashMap::new(),
            pools: HashMap::new(),
        }
    }
}

impl<C> TaskGraph<C>
where
    C: Clone + Eq + Hash + Ord + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, latency: i64, class: C) -> TaskId {
        let id = TaskId(self.nodes.len());
        self.nodes.push(TaskNode {
            latency,
            class,
            preds: Vec::new(),
            succs: Vec::new(),
            operands: Vec::new(),
            results: Vec::new(),
        });
        self.csteps.push(None);
        id
    }

    /// `succ` starts between `min_delay` and `max_delay` c-steps after `pred`.
    pub fn add_dependency(&mut self, pred: TaskId, succ: TaskId, min_delay: i64, max_delay: i64) {
        self.nodes[succ.0]
            .preds
            .push(ScheduleDependency::new(pred, min_delay, max_delay));
        self.nodes[pred.0]
            .succs
            .push(ScheduleDependency::new(succ, min_delay, max_delay));
    }

    /// `succ` consumes the result of `pred`.
    pub fn depend(&mut self, pred: TaskId, succ: TaskId) {
        let latency = self.nodes[pred.0].latency.max(0);
        self.add_dependency(pred, succ, latency, UNBOUNDED);
    }

    pub fn set_operands(&mut self, task: TaskId, slots: &[usize]) {
        self.nodes[task.0].operands = slots.to_vec();
    }

    pub fn set_results(&mut self, task: TaskId, slots: &[usize]) {
        self.nodes[task.0].results = slots.to_vec();
    }

    /// At most `units` tasks of `class` may occupy a unit at any c-step.
    pub fn set_limit(&mut self, class: C, units: usize) {
        self.limits.insert(class, units);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + use<C> {
        (0..self.nodes.len()).map(TaskId)
    }

    /// Units instantiated for `class` so far.
    pub fn reservation_tables(&self, class: &C) -> &[ReservationTable<TaskId>] {
        self.pools.get(class).map_or(&[], Vec::as_slice)
    }

    fn occupancy(&self, task: TaskId) -> i64 {
        self.nodes[task.0].latency.max(1)
    }
}

impl<C> SchedulingAdapter for TaskGraph<C>
where
    C: Clone + Eq + Hash + Ord + Debug,
{
    type Task = TaskId;
    type Class = C;

    fn index(&self, task: TaskId) -> usize {
        task.0
    }

    fn preds(&self, task: TaskId) -> &[ScheduleDependency<TaskId>] {
        &self.nodes[task.0].preds
    }

    fn succs(&self, task: TaskId) -> &[ScheduleDependency<TaskId>] {
        &self.nodes[task.0].succs
    }

    fn operands(&self, task: TaskId) -> &[usize] {
        &self.nodes[task.0].operands
    }

    fn results(&self, task: TaskId) -> &[usize] {
        &self.nodes[task.0].results
    }

    fn latency(&self, task: TaskId) -> i64 {
        self.nodes[task.0].latency
    }

    fn cstep(&self, task: TaskId) -> Option<i64> {
        self.csteps[task.0]
    }

    fn set_cstep(&mut self, task: TaskId, cstep: i64) {
        self.csteps[task.0] = Some(cstep);
    }

    fn iclass(&self, task: TaskId) -> C {
        self.nodes[task.0].class.clone()
    }

    fn try_pin(&mut self, task: TaskId, cstep: i64) -> PinResult {
        let class = &self.nodes[task.0].class;
        let Some(&limit) = self.limits.get(class) else {
            return PinResult::Pinned;
        };
        let span = self.occupancy(task) - 1;
        let pool = self.pools.entry(class.clone()).or_default();
        if pool.iter_mut().any(|t| t.try_reserve(cstep, cstep + span, task)) {
            return PinResult::Pinned;
        }
        if pool.len() < limit {
            let mut table = ReservationTable::new();
            if table.try_reserve(cstep, cstep + span, task) {
                pool.push(table);
                return PinResult::Pinned;
            }
        }

        let free = |c: i64| pool.iter().any(|t| !t.is_reserved(c, c + span));
        let (lowest, highest) = pool
            .iter()
            .flat_map(|t| t.reservations())
            .fold((cstep, cstep), |(lo, hi), r| (lo.min(r.start), hi.max(r.end)));
        let post_hint = (cstep + 1..=highest + 1)
            .find(|c| free(*c))
            .unwrap_or(highest + 1);
        let pre_hint = (lowest - span - 1..cstep)
            .rev()
            .find(|c| free(*c))
            .unwrap_or(lowest - span - 1);
        PinResult::Blocked {
            pre_hint,
            post_hint,
        }
    }

    fn clear_schedule(&mut self) {
        self.csteps.iter_mut().for_each(|c| *c = None);
        self.pools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{
        AlapScheduler, AsapScheduler, BasicBlockScheduler, ForceDirectedScheduler,
        IndexPriority, ListScheduler, MobilityPriority, OneInstructionPerCStepScheduler,
        SchedulingConstraints, SequentialScheduler, check_schedule,
    };
    use itertools::Itertools;
    use proptest::prelude::*;

    #[test]
    fn independent_tasks_share_one_unit() {
        let mut g = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        g.set_limit("alu", 1);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::window(0, 10);
        ListScheduler::<IndexPriority>::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        let (ca, cb) = (g.cstep(a).unwrap(), g.cstep(b).unwrap());
        assert!(ca != cb);
        assert!(cb >= ca + 1);
        assert_eq!(g.reservation_tables(&"alu").len(), 1);
        assert_eq!(g.reservation_tables(&"alu")[0].occupation(), 2);
    }

    #[test]
    fn fixed_distance_chain() {
        let mut g = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.add_dependency(a, b, 1, 1);
        g.add_dependency(b, c, 1, 1);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::window(0, 10);
        ListScheduler::<IndexPriority>::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        let ca = g.cstep(a).unwrap();
        assert_eq!(g.cstep(b), Some(ca + 1));
        assert_eq!(g.cstep(c), Some(ca + 2));
    }

    fn fixed_distance_chain_in_window<S: BasicBlockScheduler>(scheduler: S, end: i64) {
        let mut g = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.add_dependency(a, b, 1, 1);
        g.add_dependency(b, c, 1, 1);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::window(0, end);
        scheduler.schedule(&tasks, &mut g, &mut constraints).unwrap();
        assert_eq!(
            tasks.iter().map(|t| g.cstep(*t)).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
        assert_eq!(constraints.end_time, Some(3));
        check_schedule(&g, &tasks).unwrap();
    }

    #[test]
    fn fixed_distance_chain_fills_its_window() {
        fixed_distance_chain_in_window(ListScheduler::<IndexPriority>::default(), 3);
        fixed_distance_chain_in_window(ListScheduler::<MobilityPriority>::default(), 3);
        fixed_distance_chain_in_window(AsapScheduler::default(), 3);
        fixed_distance_chain_in_window(AsapScheduler::constrained(), 3);
        fixed_distance_chain_in_window(AlapScheduler::default(), 3);
        fixed_distance_chain_in_window(ForceDirectedScheduler, 3);
        fixed_distance_chain_in_window(SequentialScheduler, 3);
    }

    #[test]
    fn unbounded_run_ends_after_the_last_task() {
        let mut g = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.add_dependency(a, b, 1, 1);
        g.add_dependency(b, c, 1, 1);
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        ListScheduler::<MobilityPriority>::default()
            .schedule(&tasks, &mut g, &mut constraints)
            .unwrap();
        assert_eq!(constraints.end_time, Some(3));
    }

    #[test]
    fn fixed_distance_chain_in_small_window() {
        let mut g = TaskGraph::new();
        let a = g.add_task(1, "alu");
        let b = g.add_task(1, "alu");
        let c = g.add_task(1, "alu");
        g.add_dependency(a, b, 1, 1);
        g.add_dependency(b, c, 1, 1);
        let tasks: Vec<_> = g.tasks().collect();
        let err = ListScheduler::<IndexPriority>::default()
            .schedule(&tasks, &mut g, &mut SchedulingConstraints::window(0, 2))
            .unwrap_err();
        assert!(err.is_infeasible());
    }

    #[test]
    fn blocked_pin_reports_hints() {
        let mut g = TaskGraph::new();
        let a = g.add_task(2, "mul");
        let b = g.add_task(2, "mul");
        g.set_limit("mul", 1);
        assert_eq!(g.try_pin(a, 3), PinResult::Pinned);
        assert_eq!(
            g.try_pin(b, 4),
            PinResult::Blocked {
                pre_hint: 1,
                post_hint: 5
            }
        );
        g.clear_schedule();
        assert!(g.reservation_tables(&"mul").is_empty());
    }

    fn random_dag(edges: &[(usize, usize, i64)], latencies: &[i64]) -> TaskGraph<usize> {
        let mut g = TaskGraph::new();
        let ids: Vec<_> = latencies
            .iter()
            .enumerate()
            .map(|(i, lat)| g.add_task(*lat, i % 3))
            .collect();
        for (x, y, slack) in edges {
            let (p, s) = (x.min(y), x.max(y));
            if p != s {
                let min = latencies[*p];
                g.add_dependency(ids[*p], ids[*s], min, min + slack);
            }
        }
        g.set_limit(0, 1);
        g.set_limit(1, 2);
        g
    }

    /// Every edge only orders its tasks, so a schedule always exists.
    fn unbounded_dag(
        edges: &[(usize, usize)],
        latencies: &[i64],
        limited: bool,
    ) -> TaskGraph<usize> {
        let mut g = TaskGraph::new();
        let ids: Vec<_> = latencies
            .iter()
            .enumerate()
            .map(|(i, lat)| g.add_task(*lat, i % 3))
            .collect();
        for (x, y) in edges {
            let (p, s) = (x.min(y), x.max(y));
            if p != s {
                g.depend(ids[*p], ids[*s]);
            }
        }
        if limited {
            g.set_limit(0, 1);
            g.set_limit(1, 2);
        }
        g
    }

    /// No class uses more units than its limit, and no unit runs two tasks in
    /// the same c-step.
    fn conflict_free(g: &TaskGraph<usize>) -> Result<(), TestCaseError> {
        for (class, limit) in &g.limits {
            let tables = g.reservation_tables(class);
            prop_assert!(tables.len() <= *limit);
            for table in tables {
                for (x, y) in table.reservations().iter().tuple_combinations() {
                    prop_assert!(x.end < y.start || y.end < x.start, "{x:?} overlaps {y:?}");
                }
                for r in table.reservations() {
                    prop_assert_eq!(g.cstep(r.instr), Some(r.start));
                    prop_assert_eq!(r.end - r.start + 1, g.occupancy(r.instr));
                }
            }
        }
        Ok(())
    }

    fn pinned_tasks(g: &TaskGraph<usize>) -> usize {
        g.limits
            .keys()
            .flat_map(|class| g.reservation_tables(class))
            .map(|t| t.reservations().len())
            .sum()
    }

    fn run_to_completion<S: BasicBlockScheduler>(
        scheduler: S,
        g: &mut TaskGraph<usize>,
    ) -> Result<(), TestCaseError> {
        g.clear_schedule();
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        let outcome = scheduler.schedule(&tasks, g, &mut constraints);
        prop_assert!(outcome.is_ok(), "{outcome:?}");
        prop_assert!(check_schedule(g, &tasks).is_ok());
        let end = constraints.end_time.unwrap();
        for t in &tasks {
            let c = g.cstep(*t).unwrap();
            prop_assert!(c >= 0);
            prop_assert!(c + g.latency(*t).max(1) <= end);
        }
        conflict_free(g)
    }

    fn run<S: BasicBlockScheduler>(
        scheduler: S,
        g: &mut TaskGraph<usize>,
    ) -> Result<(), TestCaseError> {
        let tasks: Vec<_> = g.tasks().collect();
        let mut constraints = SchedulingConstraints::default();
        match scheduler.schedule(&tasks, g, &mut constraints) {
            Ok(()) => {
                prop_assert!(check_schedule(g, &tasks).is_ok());
                for t in &tasks {
                    prop_assert!(g.cstep(*t).unwrap() >= 0);
                }
                conflict_free(g)?;
            }
            Err(e) => prop_assert!(e.is_infeasible()),
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn schedules_respect_dependencies(
            latencies in prop::collection::vec(0i64..4, 1..12),
            edges in prop::collection::vec((0usize..12, 0usize..12, 0i64..3), 0..20),
        ) {
            let edges: Vec<_> = edges
                .into_iter()
                .filter(|(x, y, _)| *x < latencies.len() && *y < latencies.len())
                .collect();
            let mut g = random_dag(&edges, &latencies);
            run(ListScheduler::<IndexPriority>::default(), &mut g)?;
            g.clear_schedule();
            run(ListScheduler::<MobilityPriority>::default(), &mut g)?;
            g.clear_schedule();
            run(AsapScheduler::constrained(), &mut g)?;
            g.clear_schedule();
            run(AlapScheduler::default(), &mut g)?;
            g.clear_schedule();
            run(ForceDirectedScheduler, &mut g)?;
            g.clear_schedule();
            run(SequentialScheduler, &mut g)?;
            g.clear_schedule();
            run(OneInstructionPerCStepScheduler, &mut g)?;
        }

        #[test]
        fn ordering_only_dags_always_schedule(
            latencies in prop::collection::vec(0i64..4, 1..12),
            edges in prop::collection::vec((0usize..12, 0usize..12), 0..20),
        ) {
            let edges: Vec<_> = edges
                .into_iter()
                .filter(|(x, y)| *x < latencies.len() && *y < latencies.len())
                .collect();
            let limited_tasks = (0..latencies.len()).filter(|i| i % 3 != 2).count();

            let mut g = unbounded_dag(&edges, &latencies, true);
            run_to_completion(ListScheduler::<IndexPriority>::default(), &mut g)?;
            prop_assert_eq!(pinned_tasks(&g), limited_tasks);
            run_to_completion(ListScheduler::<MobilityPriority>::default(), &mut g)?;
            prop_assert_eq!(pinned_tasks(&g), limited_tasks);
            run_to_completion(AsapScheduler::constrained(), &mut g)?;
            prop_assert_eq!(pinned_tasks(&g), limited_tasks);
            run_to_completion(SequentialScheduler, &mut g)?;
            run_to_completion(OneInstructionPerCStepScheduler, &mut g)?;

            let mut g = unbounded_dag(&edges, &latencies, false);
            run_to_completion(AlapScheduler::default(), &mut g)?;
            run_to_completion(ForceDirectedScheduler, &mut g)?;
        }

        #[test]
        fn unbounded_chains_always_schedule(
            latencies in prop::collection::vec(0i64..4, 1..12),
        ) {
            let mut g = TaskGraph::new();
            let ids: Vec<_> = latencies.iter().map(|l| g.add_task(*l, 0usize)).collect();
            for w in ids.windows(2) {
                g.depend(w[0], w[1]);
            }
            g.set_limit(0, 1);
            let mut constraints = SchedulingConstraints::default();
            prop_assert!(ListScheduler::<IndexPriority>::default()
                .schedule(&ids, &mut g, &mut constraints)
                .is_ok());
            prop_assert!(check_schedule(&g, &ids).is_ok());
        }
    }
}
