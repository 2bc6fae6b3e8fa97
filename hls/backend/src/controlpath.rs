use hls_ir::{Design, FlowKind, FlowMatrix, ParFlow, SignalIdx};
use hls_opt::{ControlpathBuilder, Transition, TransitionKind};
use hls_utils::{Error, HlsResult};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextState {
    Goto(usize),
    /// Go to `target` when `cond` equals `when`, to `otherwise` if not.
    Branch {
        cond: SignalIdx,
        when: bool,
        target: usize,
        otherwise: usize,
    },
}

#[derive(Clone, Debug)]
pub struct FsmState {
    pub cstep: usize,
    /// Flows active in this state, idle defaults included.
    pub flows: ParFlow,
    /// Multiplexer input selected for every multiplexed target driven in this
    /// state.
    pub selects: BTreeMap<SignalIdx, usize>,
    pub next: NextState,
}

/// Controller with one state per c-step.
#[derive(Clone, Debug)]
pub struct Fsm {
    pub name: String,
    pub states: Vec<FsmState>,
    /// Distinct drivers of every target with more than one, in select order.
    pub mux_inputs: BTreeMap<SignalIdx, Vec<FlowKind>>,
}

impl Fsm {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn successors(&self, state: usize) -> Vec<usize> {
        match self.states[state].next {
            NextState::Goto(next) => vec![next],
            NextState::Branch {
                target, otherwise, ..
            } => vec![target, otherwise],
        }
    }

    pub fn report(&self, design: &Design) -> String {
        let signals = &design.signals;
        let mut out = String::new();
        let _ = writeln!(out, "fsm {}: {} states", self.name, self.states.len());
        for state in &self.states {
            let _ = writeln!(out, "state {}:", state.cstep);
            for flow in state.flows.flows().filter(|f| !f.is_dont_care()) {
                let _ = writeln!(out, "  {}", flow.display(signals));
            }
            for (target, select) in &state.selects {
                let _ = writeln!(out, "  select {} = {select}", signals.name(*target));
            }
            let _ = match state.next {
                NextState::Goto(next) => writeln!(out, "  -> {next}"),
                NextState::Branch {
                    cond,
                    when,
                    target,
                    otherwise,
                } => writeln!(
                    out,
                    "  -> {target} if {} == {}, else {otherwise}",
                    signals.name(cond),
                    u8::from(when)
                ),
            };
        }
        out
    }
}

/// Builds an [Fsm] from the wired flows of a design.
#[derive(Default, Debug)]
pub struct FsmControlpathBuilder {
    cstep_count: usize,
}

impl ControlpathBuilder for FsmControlpathBuilder {
    type Output = Fsm;

    fn prepare_allocation(&mut self, cstep_count: usize) {
        self.cstep_count = cstep_count;
    }

    fn create_controlpath(
        &mut self,
        _design: &Design,
        flows: &FlowMatrix,
        transitions: &[Transition],
        name: &str,
    ) -> HlsResult<Fsm> {
        let count = self.cstep_count.max(flows.num_csteps()).max(1);
        let mut leaving: HashMap<usize, &Transition> = HashMap::new();
        for t in transitions {
            if t.target >= count || t.fallthrough.is_some_and(|f| f >= count) {
                return Err(Error::malformed(format!(
                    "transition from c-step {} leaves the {count} c-steps of `{name}'",
                    t.cstep
                )));
            }
            if leaving.insert(t.cstep, t).is_some() {
                return Err(Error::malformed(format!(
                    "several transitions leave c-step {}",
                    t.cstep
                )));
            }
        }

        let mux_inputs: BTreeMap<SignalIdx, Vec<FlowKind>> = flows
            .flow_targets()
            .into_iter()
            .map(|target| (target, flows.flows_to(target)))
            .filter(|(_, drivers)| drivers.len() > 1)
            .collect();

        let mut states = Vec::with_capacity(count);
        for cstep in 0..count {
            let mut pflow = flows.neutral().clone();
            if let Some(step) = flows.flows(cstep) {
                pflow.integrate(step);
            }
            let selects = mux_inputs
                .iter()
                .filter_map(|(target, inputs)| {
                    let flow = pflow.lookup_target(*target).filter(|f| !f.is_dont_care())?;
                    inputs
                        .iter()
                        .position(|k| *k == flow.kind)
                        .map(|i| (*target, i))
                })
                .collect();
            let default = if cstep + 1 < count { cstep + 1 } else { 0 };
            let next = match leaving.get(&cstep) {
                None => NextState::Goto(default),
                Some(t) => match t.kind {
                    TransitionKind::Goto => NextState::Goto(t.target),
                    TransitionKind::Branch { cond, when } => NextState::Branch {
                        cond,
                        when,
                        target: t.target,
                        otherwise: t.fallthrough.unwrap_or(default),
                    },
                },
            };
            states.push(FsmState {
                cstep,
                flows: pflow,
                selects,
                next,
            });
        }
        log::info!(
            "{name}: {} states, {} multiplexed targets",
            states.len(),
            mux_inputs.len()
        );
        Ok(Fsm {
            name: name.to_string(),
            states,
            mux_inputs,
        })
    }
}
