use super::{BasicBlockScheduler, SchedulingAdapter, SchedulingConstraints};
use hls_utils::{Error, HlsResult};

/// The tasks of one basic block and the blocks flowing into it, back edges
/// excluded.
#[derive(Clone, Debug)]
pub struct BlockLayout<T> {
    pub tasks: Vec<T>,
    pub preds: Vec<usize>,
    /// C-steps past its latency that a task keeps belonging to the block.
    /// The block ends no earlier than `cstep + latency + drain` of every task.
    pub drain: i64,
}

/// C-steps `[start, end)` taken by a scheduled block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockSpan {
    pub start: i64,
    pub end: i64,
}

impl BlockSpan {
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Schedules a whole control-flow graph by running a block scheduler on one
/// block after another. A block starts once every forward predecessor and the
/// previously scheduled block have ended, so blocks never share c-steps.
#[derive(Default, Clone, Copy, Debug)]
pub struct FunctionScheduler<S> {
    pub block_scheduler: S,
}

impl<S: BasicBlockScheduler> FunctionScheduler<S> {
    pub fn new(block_scheduler: S) -> Self {
        Self { block_scheduler }
    }

    /// Schedules `blocks` in `order`. On success, `constraints.end_time` is
    /// the end of the last block.
    pub fn schedule<A: SchedulingAdapter>(
        &self,
        blocks: &[BlockLayout<A::Task>],
        order: &[usize],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<Vec<BlockSpan>> {
        adapter.clear_schedule();
        let mut spans = vec![BlockSpan::default(); blocks.len()];
        let mut offset = constraints.start_time;
        for &b in order {
            let layout = &blocks[b];
            let start = layout
                .preds
                .iter()
                .map(|p| spans[*p].end)
                .fold(offset, i64::max);
            let mut local = constraints.starting_at(start);
            if !layout.tasks.is_empty() {
                self.block_scheduler
                    .schedule(&layout.tasks, adapter, &mut local)?;
            }
            let drained = layout
                .tasks
                .iter()
                .filter_map(|t| adapter.cstep(*t).map(|c| c + adapter.latency(*t).max(0)))
                .map(|c| c + layout.drain)
                .fold(start + 1, i64::max);
            let end = local.end_time.unwrap_or(start).max(drained);
            log::debug!("block {b}: c-steps [{start}, {end})");
            spans[b] = BlockSpan { start, end };
            offset = end;
        }
        if let Some(bound) = constraints.end_time.filter(|b| offset > *b) {
            return Err(Error::infeasible(format!(
                "function ends in c-step {offset}, window ends in c-step {bound}"
            )));
        }
        constraints.end_time = Some(offset);
        Ok(spans)
    }
}
