//! Binding of scheduled instructions to functional units.
mod allocator;
mod context_sensitive;
mod mapper;
mod policy;
mod reservation_table;

pub use allocator::{Allocator, Binding, ClassStats, UnitStats};
pub use context_sensitive::{ContextSensitiveAllocation, Interlink, InterlinkIdx};
pub use mapper::{
    ConstMapper, ControlMapper, FuLibrary, FuMapper, Mapper, MapperId,
    MapperRegistry, Mapping, PortMapper, Realization, UnitTiming, VariableMapper,
    WireMapper,
};
pub use policy::{AllocationDecision, AllocationPolicy, DefaultAllocationPolicy};
pub use reservation_table::{Reservation, ReservationTable};
