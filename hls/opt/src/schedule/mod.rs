//! Scheduling algorithms.
//!
//! Every algorithm implements [BasicBlockScheduler] and works on any
//! [SchedulingAdapter]. [FunctionScheduler] composes a block-level algorithm
//! over a control-flow graph.
mod adapter;
mod alap;
mod asap;
mod aslap;
mod constraints;
mod force_directed;
mod function;
mod list;
mod profiler;
mod sequential;
mod task_graph;

pub use adapter::{
    BasicBlockScheduler, PinResult, ScheduleDependency, SchedulingAdapter,
    UNBOUNDED, check_schedule, completion, task_end,
};
pub use alap::AlapScheduler;
pub use asap::AsapScheduler;
pub use aslap::{AslapAdapter, TimeFrames};
pub use constraints::SchedulingConstraints;
pub use force_directed::ForceDirectedScheduler;
pub use function::{BlockLayout, BlockSpan, FunctionScheduler};
pub use list::{
    AsapPriority, IndexPriority, ListScheduler, MobilityPriority, PriorityPolicy,
};
pub use profiler::ScheduleProfiler;
pub use sequential::{OneInstructionPerCStepScheduler, SequentialScheduler};
pub use task_graph::{TaskGraph, TaskId};
