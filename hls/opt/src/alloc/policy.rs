use super::Mapping;
use hls_ir::{Design, Function, Instr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationDecision {
    /// Bind the instruction to the unit of the chosen mapping.
    UseExisting,
    /// Instantiate a new unit instead.
    AllocateNew,
}

/// Decides whether an instruction shares an existing unit.
pub trait AllocationPolicy {
    /// Picks one of `mappings`, which is never empty, and decides whether to
    /// use it or to allocate a new unit. Returns the index of the chosen
    /// mapping.
    fn select_best_mapping(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        cstep: i64,
        mappings: &[Mapping],
    ) -> (AllocationDecision, usize);

    /// Informs the policy about the mapping finally bound to `instr`.
    fn tell_mapping(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        cstep: i64,
        mapping: &Mapping,
    );
}

/// Shares whenever possible.
#[derive(Default, Clone, Copy, Debug)]
pub struct DefaultAllocationPolicy;

impl AllocationPolicy for DefaultAllocationPolicy {
    fn select_best_mapping(
        &mut self,
        _design: &mut Design,
        _instr: &Instr,
        _func: &Function,
        _cstep: i64,
        _mappings: &[Mapping],
    ) -> (AllocationDecision, usize) {
        (AllocationDecision::UseExisting, 0)
    }

    fn tell_mapping(
        &mut self,
        _design: &mut Design,
        _instr: &Instr,
        _func: &Function,
        _cstep: i64,
        _mapping: &Mapping,
    ) {
    }
}
