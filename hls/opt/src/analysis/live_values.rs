use crate::schedule::{SchedulingAdapter, completion};
use std::collections::{BTreeMap, HashMap};

/// Number of values alive in every c-step of a scheduled task set.
///
/// A value is alive from the c-step its producer completes up to and including
/// its last use. Values without a use inside `tasks` live for one c-step.
/// Unscheduled tasks are ignored.
pub fn live_values<A: SchedulingAdapter>(adapter: &A, tasks: &[A::Task]) -> BTreeMap<i64, usize> {
    let mut defs: HashMap<usize, i64> = HashMap::new();
    let mut last_use: HashMap<usize, i64> = HashMap::new();
    for task in tasks {
        let Some(cstep) = adapter.cstep(*task) else {
            continue;
        };
        let done = completion(adapter, *task, cstep);
        for slot in adapter.results(*task) {
            defs.insert(*slot, done);
        }
        for slot in adapter.operands(*task) {
            let entry = last_use.entry(*slot).or_insert(cstep);
            *entry = (*entry).max(cstep);
        }
    }

    let mut live = BTreeMap::new();
    for (slot, def) in defs {
        let until = last_use.get(&slot).copied().unwrap_or(def).max(def);
        for c in def..=until {
            *live.entry(c).or_insert(0) += 1;
        }
    }
    live
}
