//! Builders turning a scheduled and bound function into hardware: the
//! datapath, the interconnect with its registers, and the controlling state
//! machine.
mod controlpath;
mod datapath;
mod interconnect;
mod report;

pub use controlpath::{Fsm, FsmControlpathBuilder, FsmState, NextState};
pub use datapath::DefaultDatapathBuilder;
pub use interconnect::MinRegInterconnectBuilder;
pub use report::{HlsReport, ProfilerReport, ScheduledInstr};
