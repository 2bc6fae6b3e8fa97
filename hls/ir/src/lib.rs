//! Intermediate representation of the HLS scheduler.
//!
//! A [Function] is a list of three-address instructions over numbered value
//! slots. Scheduling assigns each instruction a c-step, allocation binds it to
//! a functional [Unit] held in the [Design] arena, and the resulting data
//! movement is recorded as [Flow]s collected per c-step in a [FlowMatrix].
mod cfg;
mod design;
mod flow;
mod flow_matrix;
mod function;
mod instr;
mod signal;
mod stmt;
mod unit;

pub use cfg::{BasicBlock, ControlFlowGraph};
pub use design::{Design, PortCounts};
pub use flow::{Flow, FlowKind, ParFlow};
pub use flow_matrix::FlowMatrix;
pub use function::Function;
pub use instr::{CmpOp, Instr, InstrDep, InstrIdx, OpKind, Opcode, SlotIdx};
pub use signal::{Signal, SignalIdx, SignalKind, SignalTable};
pub use stmt::{Expr, Process, Stmt, Value};
pub use unit::{FuClass, FuSpec, InstrClass, ResourceKind, Unit, UnitIdx};
