//! Scheduling, allocation and binding passes of the HLS flow.
//!
//! The [schedule] module holds the algorithms, written against the
//! [SchedulingAdapter](schedule::SchedulingAdapter) trait so that they can run
//! on any task graph. [XilSchedulingAdapter] connects them to a
//! [Function](hls_ir::Function) and drives allocation through the [alloc]
//! module. [HlsPlan] runs the whole flow.
pub mod alloc;
pub mod analysis;
mod builders;
mod plan;
pub mod schedule;
mod xil_adapter;

pub use builders::{
    ControlpathBuilder, DatapathBuilder, InterconnectBuilder, Transition,
    TransitionKind,
};
pub use plan::{HlsOutcome, HlsPlan, PolicyKind, SchedulerKind};
pub use xil_adapter::XilSchedulingAdapter;
