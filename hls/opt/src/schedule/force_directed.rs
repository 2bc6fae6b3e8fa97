use super::{
    BasicBlockScheduler, PinResult, SchedulingAdapter, SchedulingConstraints, TimeFrames,
    adapter::span_end,
};
use hls_utils::{Error, HlsResult};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Time-constrained scheduling that balances the expected number of
/// concurrently executing tasks of every class.
///
/// Every unplaced task is spread uniformly over its time frame; summing these
/// probabilities per class gives the distribution graphs. The task and c-step
/// with the lowest force are fixed next, and the frames of the other tasks are
/// narrowed accordingly.
#[derive(Default, Clone, Copy, Debug)]
pub struct ForceDirectedScheduler;

type Frames<T> = HashMap<T, (i64, i64)>;

struct Distribution<C> {
    graphs: HashMap<C, BTreeMap<i64, f64>>,
}

impl<C: Eq + std::hash::Hash + Clone> Distribution<C> {
    fn build<A>(adapter: &A, frames: &Frames<A::Task>) -> Self
    where
        A: SchedulingAdapter<Class = C>,
    {
        let mut graphs: HashMap<C, BTreeMap<i64, f64>> = HashMap::new();
        for (task, (lo, hi)) in frames {
            let graph = graphs.entry(adapter.iclass(*task)).or_default();
            let p = 1.0 / (hi - lo + 1) as f64;
            for c in *lo..=*hi {
                *graph.entry(c).or_default() += p;
            }
        }
        Self { graphs }
    }

    /// Mean of the distribution graph over `[lo, hi]`.
    fn average(&self, class: &C, lo: i64, hi: i64) -> f64 {
        if lo > hi {
            return f64::INFINITY;
        }
        let Some(graph) = self.graphs.get(class) else {
            return 0.0;
        };
        graph.range(lo..=hi).map(|(_, v)| v).sum::<f64>() / (hi - lo + 1) as f64
    }

    /// Change of the expected load when a frame shrinks to `[lo, hi]`.
    fn force(&self, class: &C, current: (i64, i64), lo: i64, hi: i64) -> f64 {
        if (lo, hi) == current {
            return 0.0;
        }
        self.average(class, lo, hi) - self.average(class, current.0, current.1)
    }
}

impl ForceDirectedScheduler {
    fn total_force<A: SchedulingAdapter>(
        adapter: &A,
        dist: &Distribution<A::Class>,
        frames: &Frames<A::Task>,
        task: A::Task,
        cstep: i64,
    ) -> f64 {
        let current = frames[&task];
        let mut force = dist.force(&adapter.iclass(task), current, cstep, cstep);
        for dep in adapter.preds(task) {
            if let Some(&(lo, hi)) = frames.get(&dep.task) {
                let upper = hi.min(cstep - dep.min_delay);
                let lower = if dep.is_bounded() {
                    lo.max(cstep.saturating_sub(dep.max_delay))
                } else {
                    lo
                };
                force += dist.force(&adapter.iclass(dep.task), (lo, hi), lower, upper);
            }
        }
        for dep in adapter.succs(task) {
            if let Some(&(lo, hi)) = frames.get(&dep.task) {
                let lower = lo.max(cstep + dep.min_delay);
                let upper = if dep.is_bounded() {
                    hi.min(cstep.saturating_add(dep.max_delay))
                } else {
                    hi
                };
                force += dist.force(&adapter.iclass(dep.task), (lo, hi), lower, upper);
            }
        }
        force
    }

    /// Narrows the frames of all tasks reachable from `origin` until they are
    /// consistent with every dependency again.
    fn propagate<A: SchedulingAdapter>(
        adapter: &A,
        frames: &mut Frames<A::Task>,
        origin: A::Task,
    ) -> HlsResult<()> {
        let mut worklist = vec![origin];
        while let Some(task) = worklist.pop() {
            let (lo, hi) = frames[&task];
            for dep in adapter.succs(task) {
                let Some(&(slo, shi)) = frames.get(&dep.task) else {
                    continue;
                };
                let nlo = slo.max(lo + dep.min_delay);
                let nhi = if dep.is_bounded() {
                    shi.min(hi.saturating_add(dep.max_delay))
                } else {
                    shi
                };
                if (nlo, nhi) != (slo, shi) {
                    if nlo > nhi {
                        return Err(Error::infeasible(format!(
                            "time frame of {:?} became empty",
                            dep.task
                        )));
                    }
                    frames.insert(dep.task, (nlo, nhi));
                    worklist.push(dep.task);
                }
            }
            for dep in adapter.preds(task) {
                let Some(&(plo, phi)) = frames.get(&dep.task) else {
                    continue;
                };
                let nhi = phi.min(hi - dep.min_delay);
                let nlo = if dep.is_bounded() {
                    plo.max(lo.saturating_sub(dep.max_delay))
                } else {
                    plo
                };
                if (nlo, nhi) != (plo, phi) {
                    if nlo > nhi {
                        return Err(Error::infeasible(format!(
                            "time frame of {:?} became empty",
                            dep.task
                        )));
                    }
                    frames.insert(dep.task, (nlo, nhi));
                    worklist.push(dep.task);
                }
            }
        }
        Ok(())
    }
}

impl BasicBlockScheduler for ForceDirectedScheduler {
    fn schedule<A: SchedulingAdapter>(
        &self,
        tasks: &[A::Task],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<()> {
        if tasks.is_empty() {
            constraints.end_time = Some(constraints.start_time);
            return Ok(());
        }
        let start = constraints.start_time;
        let initial = TimeFrames::compute(tasks, &*adapter, &constraints.starting_at(start))?;
        let asap_end = initial.asap_end;
        let extent = match constraints.end_time {
            Some(bound) if asap_end > bound => {
                return Err(Error::infeasible(format!(
                    "critical path ends in c-step {asap_end}, window ends in c-step {bound}"
                )));
            }
            Some(bound) => bound - start,
            None => {
                let max_concurrency: i64 = tasks
                    .iter()
                    .map(|t| (initial.asap(*t), adapter.iclass(*t)))
                    .counts()
                    .values()
                    .map(|n| *n as i64 - 1)
                    .sum();
                let length = asap_end - start;
                (length + max_concurrency)
                    .min((length as f64 * constraints.sched_scale).ceil() as i64)
                    .max(length)
            }
        };
        let bounds =
            TimeFrames::with_end(tasks, &*adapter, &constraints.starting_at(start), start + extent)?;
        let mut frames: Frames<A::Task> = tasks
            .iter()
            .map(|t| (*t, (bounds.asap(*t), bounds.alap(*t).max(bounds.asap(*t)))))
            .collect();
        log::debug!(
            "force-directed scheduling {} tasks within [{start}, {})",
            tasks.len(),
            start + extent
        );

        let mut unplaced: HashSet<A::Task> = tasks.iter().copied().collect();
        while !unplaced.is_empty() {
            let dist = Distribution::build(&*adapter, &frames);
            let mut candidates: Vec<(f64, usize, i64, A::Task)> = unplaced
                .iter()
                .flat_map(|t| {
                    let (lo, hi) = frames[t];
                    (lo..=hi).map(move |c| (*t, c))
                })
                .map(|(t, c)| {
                    let force = Self::total_force(&*adapter, &dist, &frames, t, c);
                    (force, adapter.index(t), c, t)
                })
                .filter(|(force, ..)| force.is_finite())
                .collect();
            candidates.sort_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            });

            let Some((task, cstep)) = candidates
                .into_iter()
                .find(|(_, _, c, t)| adapter.try_pin(*t, *c) == PinResult::Pinned)
                .map(|(_, _, c, t)| (t, c))
            else {
                return Err(Error::infeasible(format!(
                    "no c-step left for {} tasks",
                    unplaced.len()
                )));
            };
            frames.insert(task, (cstep, cstep));
            Self::propagate(&*adapter, &mut frames, task)?;
            unplaced.remove(&task);
        }

        for task in tasks {
            adapter.set_cstep(*task, frames[task].0);
        }
        constraints.end_time = Some(span_end(adapter, tasks, start));
        Ok(())
    }
}
