use super::{
    AlapScheduler, AsapScheduler, BasicBlockScheduler, PinResult, ScheduleDependency,
    SchedulingAdapter, SchedulingConstraints,
};
use hls_utils::{Error, HlsResult};
use std::collections::HashMap;

/// Overlay that keeps c-steps apart from the wrapped adapter, so that time
/// frames can be computed without touching the real schedule. Resources are
/// ignored: every pin succeeds.
pub struct AslapAdapter<'a, A: SchedulingAdapter> {
    inner: &'a A,
    csteps: HashMap<A::Task, i64>,
}

impl<'a, A: SchedulingAdapter> AslapAdapter<'a, A> {
    pub fn new(inner: &'a A) -> Self {
        Self {
            inner,
            csteps: HashMap::new(),
        }
    }

    pub fn into_csteps(self) -> HashMap<A::Task, i64> {
        self.csteps
    }
}

impl<A: SchedulingAdapter> SchedulingAdapter for AslapAdapter<'_, A> {
    type Task = A::Task;
    type Class = A::Class;

    fn index(&self, task: Self::Task) -> usize {
        self.inner.index(task)
    }

    fn preds(&self, task: Self::Task) -> &[ScheduleDependency<Self::Task>] {
        self.inner.preds(task)
    }

    fn succs(&self, task: Self::Task) -> &[ScheduleDependency<Self::Task>] {
        self.inner.succs(task)
    }

    fn operands(&self, task: Self::Task) -> &[usize] {
        self.inner.operands(task)
    }

    fn results(&self, task: Self::Task) -> &[usize] {
        self.inner.results(task)
    }

    fn latency(&self, task: Self::Task) -> i64 {
        self.inner.latency(task)
    }

    fn cstep(&self, task: Self::Task) -> Option<i64> {
        self.csteps.get(&task).copied()
    }

    fn set_cstep(&mut self, task: Self::Task, cstep: i64) {
        self.csteps.insert(task, cstep);
    }

    fn iclass(&self, task: Self::Task) -> Self::Class {
        self.inner.iclass(task)
    }

    fn try_pin(&mut self, _task: Self::Task, _cstep: i64) -> PinResult {
        PinResult::Pinned
    }

    fn clear_schedule(&mut self) {
        self.csteps.clear();
    }
}

/// Earliest and latest start c-steps of every task, ignoring resources.
#[derive(Debug, Clone)]
pub struct TimeFrames<T> {
    asap: HashMap<T, i64>,
    alap: HashMap<T, i64>,
    /// End of the unconstrained ASAP schedule.
    pub asap_end: i64,
    /// End the latest start times were computed against.
    pub alap_end: i64,
}

impl<T: Copy + Eq + std::hash::Hash> TimeFrames<T> {
    /// Runs ASAP and ALAP on overlays of `adapter`. A hard end bound in
    /// `constraints` that the ASAP schedule already exceeds is infeasible.
    /// Without a bound, the ALAP end is the ASAP end stretched by the
    /// scheduling scale.
    pub fn compute<A>(
        tasks: &[T],
        adapter: &A,
        constraints: &SchedulingConstraints,
    ) -> HlsResult<Self>
    where
        A: SchedulingAdapter<Task = T>,
    {
        let (asap, asap_end) = Self::earliest(tasks, adapter, constraints)?;
        let alap_end = match constraints.end_time {
            Some(bound) if asap_end > bound => {
                return Err(Error::infeasible(format!(
                    "critical path ends in c-step {asap_end}, window ends in c-step {bound}"
                )));
            }
            Some(bound) => bound,
            None => constraints.scaled_end(asap_end).max(asap_end),
        };
        Self::with_alap_end(tasks, adapter, constraints, asap, asap_end, alap_end)
    }

    /// Like [TimeFrames::compute] with an explicit ALAP end.
    pub fn with_end<A>(
        tasks: &[T],
        adapter: &A,
        constraints: &SchedulingConstraints,
        alap_end: i64,
    ) -> HlsResult<Self>
    where
        A: SchedulingAdapter<Task = T>,
    {
        let (asap, asap_end) = Self::earliest(tasks, adapter, constraints)?;
        Self::with_alap_end(tasks, adapter, constraints, asap, asap_end, alap_end)
    }

    fn earliest<A>(
        tasks: &[T],
        adapter: &A,
        constraints: &SchedulingConstraints,
    ) -> HlsResult<(HashMap<T, i64>, i64)>
    where
        A: SchedulingAdapter<Task = T>,
    {
        let start = constraints.start_time;
        let mut overlay = AslapAdapter::new(adapter);
        let mut local = constraints.starting_at(start);
        AsapScheduler::default().schedule(tasks, &mut overlay, &mut local)?;
        Ok((overlay.into_csteps(), local.end_time.unwrap_or(start)))
    }

    fn with_alap_end<A>(
        tasks: &[T],
        adapter: &A,
        constraints: &SchedulingConstraints,
        asap: HashMap<T, i64>,
        asap_end: i64,
        alap_end: i64,
    ) -> HlsResult<Self>
    where
        A: SchedulingAdapter<Task = T>,
    {
        let mut overlay = AslapAdapter::new(adapter);
        let mut alap_constraints = constraints.starting_at(constraints.start_time);
        alap_constraints.end_time = Some(alap_end);
        let alap = match AlapScheduler::default().schedule(
            tasks,
            &mut overlay,
            &mut alap_constraints,
        ) {
            Ok(()) => overlay.into_csteps(),
            Err(e) => {
                log::debug!("latest start times unavailable ({e}), using earliest");
                asap.clone()
            }
        };
        Ok(Self {
            asap,
            alap,
            asap_end,
            alap_end,
        })
    }

    pub fn asap(&self, task: T) -> i64 {
        self.asap.get(&task).copied().unwrap_or_default()
    }

    pub fn alap(&self, task: T) -> i64 {
        self.alap
            .get(&task)
            .copied()
            .unwrap_or_else(|| self.asap(task))
    }

    /// Number of c-steps the task can be delayed without stretching the
    /// schedule beyond the ALAP end.
    pub fn mobility(&self, task: T) -> i64 {
        self.alap(task) - self.asap(task)
    }
}
