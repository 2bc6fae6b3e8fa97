//! Shared utilities for the HLS scheduler.
mod errors;
mod idx;
mod interval_set;
mod namegenerator;
mod out_file;
mod priority_queue;

pub use errors::{Error, HlsResult};
pub use idx::{IndexRef, IndexedMap};
pub use interval_set::IntervalSet;
pub use namegenerator::NameGenerator;
pub use out_file::OutputFile;
pub use priority_queue::{PriorityQueue, Resolver};
