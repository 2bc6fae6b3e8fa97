use hls_ir::{Design, FlowMatrix, SignalIdx, UnitIdx};
use hls_utils::HlsResult;

/// Receives every functional unit as it is instantiated.
pub trait DatapathBuilder {
    fn add_unit(&mut self, design: &Design, unit: UnitIdx);
}

/// Turns the flows produced by allocation, which still move values through
/// temporaries, into physical wiring.
pub trait InterconnectBuilder {
    fn create_interconnect(
        &mut self,
        design: &mut Design,
        datapath: &mut dyn DatapathBuilder,
        flows: &FlowMatrix,
    ) -> HlsResult<FlowMatrix>;
}

/// Builds the controller sequencing the c-steps.
pub trait ControlpathBuilder {
    type Output;

    /// Called once the schedule length is known, before allocation starts.
    fn prepare_allocation(&mut self, cstep_count: usize);

    fn create_controlpath(
        &mut self,
        design: &Design,
        flows: &FlowMatrix,
        transitions: &[Transition],
        name: &str,
    ) -> HlsResult<Self::Output>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Goto,
    /// Taken when `cond` equals `when`.
    Branch { cond: SignalIdx, when: bool },
}

/// Control transfer leaving `cstep`. When a branch is not taken the controller
/// proceeds to `fallthrough`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub cstep: usize,
    pub kind: TransitionKind,
    pub target: usize,
    pub fallthrough: Option<usize>,
}
