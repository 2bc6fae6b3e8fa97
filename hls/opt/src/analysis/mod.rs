//! Analyses shared by the scheduling and interconnect passes.
mod graph_coloring;
mod live_values;

pub use graph_coloring::GraphColoring;
pub use live_values::live_values;
