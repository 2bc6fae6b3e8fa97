use hls_ir::{
    Design, Flow, FlowKind, FlowMatrix, FuClass, PortCounts, ResourceKind, SignalIdx,
    UnitIdx, Value,
};
use hls_opt::{DatapathBuilder, InterconnectBuilder, analysis::GraphColoring};
use hls_utils::{Error, HlsResult};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// The single write of a temporary.
#[derive(Clone, Copy, Debug)]
struct Definition {
    cstep: usize,
    kind: FlowKind,
}

/// Resolves temporaries with as few registers as the value lifetimes allow.
///
/// A temporary read in the c-step it is written becomes a direct connection to
/// its driver. Constants are driven as values wherever they are read. Every
/// other value is written to a register in the c-step it is produced and read
/// from the register's output afterwards. Values whose lifetimes do not
/// overlap share a register.
#[derive(Default, Debug)]
pub struct MinRegInterconnectBuilder {
    registers: Vec<UnitIdx>,
    bindings: BTreeMap<SignalIdx, UnitIdx>,
}

struct Resolver<'a> {
    design: &'a Design,
    defs: HashMap<SignalIdx, Definition>,
    registers: &'a BTreeMap<SignalIdx, UnitIdx>,
}

impl Resolver<'_> {
    fn is_temporary(&self, signal: SignalIdx) -> bool {
        self.design.signals.temporary_slot(signal).is_some()
    }

    fn definition(&self, temp: SignalIdx) -> HlsResult<Definition> {
        self.defs.get(&temp).copied().ok_or_else(|| {
            Error::malformed(format!(
                "`{}' is read but never written",
                self.design.signals.name(temp)
            ))
        })
    }

    /// Constant a temporary carries, following wires between temporaries.
    fn constant(&self, temp: SignalIdx, depth: usize) -> HlsResult<Option<Value>> {
        if depth > self.defs.len() {
            return Err(Error::CyclicDataflow(self.design.signals.name(temp).to_string()));
        }
        match self.definition(temp)?.kind {
            FlowKind::Value(v) => Ok(Some(v)),
            FlowKind::Signal(src) if self.is_temporary(src) => self.constant(src, depth + 1),
            _ => Ok(None),
        }
    }

    /// What drives `temp` when it is read in `cstep`.
    fn resolve(&self, temp: SignalIdx, cstep: usize, depth: usize) -> HlsResult<FlowKind> {
        if depth > self.defs.len() {
            return Err(Error::CyclicDataflow(self.design.signals.name(temp).to_string()));
        }
        let def = self.definition(temp)?;
        if cstep < def.cstep {
            return Err(Error::malformed(format!(
                "`{}' is read in c-step {cstep} but written in c-step {}",
                self.design.signals.name(temp),
                def.cstep
            )));
        }
        if let Some(v) = self.constant(temp, 0)? {
            return Ok(FlowKind::Value(v));
        }
        if cstep > def.cstep {
            let reg = self.registers.get(&temp).ok_or_else(|| {
                Error::misc(format!("no register holds `{}'", self.design.signals.name(temp)))
            })?;
            return Ok(FlowKind::Signal(self.design.unit(*reg).outputs[0]));
        }
        match def.kind {
            FlowKind::Signal(src) if self.is_temporary(src) => self.resolve(src, cstep, depth + 1),
            kind => Ok(kind),
        }
    }

    /// Rewrites a flow reading a temporary.
    fn rewrite(&self, flow: &Flow, cstep: usize) -> HlsResult<FlowKind> {
        match flow.kind {
            FlowKind::Signal(src) if self.is_temporary(src) => self.resolve(src, cstep, 0),
            _ if flow.source().is_some_and(|s| self.is_temporary(s)) => Err(Error::unsupported(
                "delayed or timed reads of temporaries",
            )),
            kind => Ok(kind),
        }
    }
}

impl MinRegInterconnectBuilder {
    pub fn registers(&self) -> &[UnitIdx] {
        &self.registers
    }

    pub fn register_of(&self, temp: SignalIdx) -> Option<UnitIdx> {
        self.bindings.get(&temp).copied()
    }

    fn definitions(design: &Design, flows: &FlowMatrix) -> HlsResult<HashMap<SignalIdx, Definition>> {
        let mut defs: HashMap<SignalIdx, Definition> = HashMap::new();
        for (cstep, pflow) in flows.iter() {
            for flow in pflow.flows() {
                if design.signals.temporary_slot(flow.target).is_none() {
                    continue;
                }
                if let Some(prev) = defs.insert(
                    flow.target,
                    Definition {
                        cstep,
                        kind: flow.kind,
                    },
                ) {
                    return Err(Error::malformed(format!(
                        "`{}' is written in c-steps {} and {cstep}",
                        design.signals.name(flow.target),
                        prev.cstep
                    )));
                }
            }
        }
        Ok(defs)
    }

    /// Binds the values living across c-steps to registers.
    fn bind_registers(
        &mut self,
        design: &mut Design,
        datapath: &mut dyn DatapathBuilder,
        flows: &FlowMatrix,
        defs: &HashMap<SignalIdx, Definition>,
    ) -> HlsResult<()> {
        let mut last_use: HashMap<SignalIdx, usize> = HashMap::new();
        for (cstep, pflow) in flows.iter() {
            for src in pflow.flows().filter_map(Flow::source) {
                let Some(def) = defs.get(&src) else {
                    continue;
                };
                if cstep > def.cstep {
                    let last = last_use.entry(src).or_insert(cstep);
                    *last = (*last).max(cstep);
                }
            }
        }
        let resolver = Resolver {
            design,
            defs: defs.clone(),
            registers: &self.bindings,
        };
        let mut lifetimes = Vec::new();
        for (temp, last) in last_use {
            if resolver.constant(temp, 0)?.is_none() {
                lifetimes.push((defs[&temp].cstep + 1, last, temp));
            }
        }
        lifetimes.sort();

        let mut conflicts = GraphColoring::default();
        for (i, (start, end, temp)) in lifetimes.iter().enumerate() {
            conflicts.add_node(*temp);
            let width = design.signals.get(*temp).width;
            for (other_start, other_end, other) in &lifetimes[..i] {
                if (start <= other_end && other_start <= end)
                    || design.signals.get(*other).width != width
                {
                    conflicts.insert_conflict(*temp, *other);
                }
            }
        }
        let coloring = conflicts.color_greedy_with(lifetimes.iter().map(|(_, _, t)| *t));

        let mut by_color: BTreeMap<usize, UnitIdx> = BTreeMap::new();
        for (_, _, temp) in &lifetimes {
            let color = coloring[temp];
            let reg = match by_color.get(&color) {
                Some(reg) => *reg,
                None => {
                    let width = design.signals.get(*temp).width;
                    let reg = design.add_unit(
                        FuClass::Register,
                        None,
                        width,
                        PortCounts {
                            inputs: 1,
                            outputs: 1,
                            controls: 1,
                        },
                        ResourceKind::Shared,
                    );
                    datapath.add_unit(design, reg);
                    self.registers.push(reg);
                    by_color.insert(color, reg);
                    reg
                }
            };
            self.bindings.insert(*temp, reg);
        }
        log::info!(
            "{} values live across c-steps, {} registers",
            lifetimes.len(),
            self.registers.len()
        );
        Ok(())
    }
}

impl InterconnectBuilder for MinRegInterconnectBuilder {
    fn create_interconnect(
        &mut self,
        design: &mut Design,
        datapath: &mut dyn DatapathBuilder,
        flows: &FlowMatrix,
    ) -> HlsResult<FlowMatrix> {
        let defs = Self::definitions(design, flows)?;
        self.bind_registers(design, datapath, flows, &defs)?;
        let resolver = Resolver {
            design,
            defs,
            registers: &self.bindings,
        };

        let mut out = FlowMatrix::new();
        out.reserve_csteps(flows.num_csteps());
        out.add_neutral(flows.neutral());
        for reg in &self.registers {
            out.add_neutral(&design.do_nothing(*reg));
        }
        for (cstep, pflow) in flows.iter() {
            for comment in flows.comments(cstep) {
                out.append_comment(cstep, comment.clone());
            }
            for flow in pflow.flows() {
                if resolver.is_temporary(flow.target) {
                    continue;
                }
                let kind = resolver.rewrite(flow, cstep)?;
                out.add(
                    cstep,
                    Flow {
                        target: flow.target,
                        kind,
                    },
                )?;
            }
        }
        for (temp, reg) in self.bindings.iter().sorted_by_key(|(t, _)| resolver.defs[*t].cstep) {
            let cstep = resolver.defs[temp].cstep;
            let unit = design.unit(*reg);
            out.add(
                cstep,
                Flow {
                    target: unit.inputs[0],
                    kind: resolver.resolve(*temp, cstep, 0)?,
                },
            )?;
            out.add(cstep, Flow::value(unit.controls[0], Value::Int(1)))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultDatapathBuilder;
    use hls_ir::SlotIdx;

    struct Fixture {
        design: Design,
        port_a: UnitIdx,
        adder: UnitIdx,
        port_y: UnitIdx,
        temps: Vec<SignalIdx>,
    }

    fn fixture() -> Fixture {
        let mut design = Design::new();
        let port = PortCounts {
            inputs: 1,
            outputs: 1,
            controls: 0,
        };
        let port_a = design.add_unit(FuClass::Port, Some("a".into()), 8, port, ResourceKind::Exclusive);
        let adder = design.add_unit(
            FuClass::Adder,
            None,
            8,
            PortCounts {
                inputs: 2,
                outputs: 1,
                controls: 1,
            },
            ResourceKind::Shared,
        );
        let port_y = design.add_unit(FuClass::Port, Some("y".into()), 8, port, ResourceKind::Exclusive);
        let temps = (0..3)
            .map(|s| design.add_temporary(SlotIdx::from(s as usize), 8))
            .collect();
        Fixture {
            design,
            port_a,
            adder,
            port_y,
            temps,
        }
    }

    #[test]
    fn disjoint_lifetimes_share_a_register() {
        let Fixture {
            mut design,
            port_a,
            adder,
            port_y,
            temps,
        } = fixture();
        let (a, add, y) = (
            design.unit(port_a).clone(),
            design.unit(adder).clone(),
            design.unit(port_y).clone(),
        );
        let mut flows = FlowMatrix::new();
        flows.add(0, Flow::value(temps[0], Value::Int(3))).unwrap();
        flows.add(0, Flow::signal(temps[1], a.outputs[0])).unwrap();
        flows.add(0, Flow::signal(add.inputs[0], temps[0])).unwrap();
        flows.add(0, Flow::signal(add.inputs[1], temps[1])).unwrap();
        flows.add(1, Flow::signal(temps[2], add.outputs[0])).unwrap();
        flows.add(1, Flow::signal(add.inputs[0], temps[1])).unwrap();
        flows.add(1, Flow::signal(add.inputs[1], temps[0])).unwrap();
        flows.add(2, Flow::signal(y.inputs[0], temps[2])).unwrap();

        let mut builder = MinRegInterconnectBuilder::default();
        let mut datapath = DefaultDatapathBuilder::default();
        let out = builder
            .create_interconnect(&mut design, &mut datapath, &flows)
            .unwrap();
        assert_eq!(builder.registers().len(), 1);
        assert_eq!(datapath.units(), builder.registers());
        let reg = design.unit(builder.registers()[0]).clone();
        assert_eq!(builder.register_of(temps[1]), builder.register_of(temps[2]));
        assert_eq!(builder.register_of(temps[0]), None);

        let driver = |cstep: usize, target: SignalIdx| {
            out.flows(cstep).and_then(|p| p.lookup_target(target)).map(|f| f.kind)
        };
        assert_eq!(driver(0, add.inputs[0]), Some(FlowKind::Value(Value::Int(3))));
        assert_eq!(driver(0, add.inputs[1]), Some(FlowKind::Signal(a.outputs[0])));
        assert_eq!(driver(0, reg.inputs[0]), Some(FlowKind::Signal(a.outputs[0])));
        assert_eq!(driver(0, reg.controls[0]), Some(FlowKind::Value(Value::Int(1))));
        assert_eq!(driver(1, add.inputs[0]), Some(FlowKind::Signal(reg.outputs[0])));
        assert_eq!(driver(1, add.inputs[1]), Some(FlowKind::Value(Value::Int(3))));
        assert_eq!(driver(1, reg.inputs[0]), Some(FlowKind::Signal(add.outputs[0])));
        assert_eq!(driver(2, y.inputs[0]), Some(FlowKind::Signal(reg.outputs[0])));
        assert!(out.flow_targets().iter().all(|t| !temps.contains(t)));
        assert_eq!(
            out.neutral().lookup_target(reg.controls[0]).map(|f| f.kind),
            Some(FlowKind::Value(Value::Int(0)))
        );
    }

    #[test]
    fn overlapping_lifetimes_need_two_registers() {
        let Fixture {
            mut design,
            port_a,
            adder,
            port_y,
            temps,
        } = fixture();
        let (a, add, y) = (
            design.unit(port_a).clone(),
            design.unit(adder).clone(),
            design.unit(port_y).clone(),
        );
        let mut flows = FlowMatrix::new();
        flows.add(0, Flow::signal(temps[1], a.outputs[0])).unwrap();
        flows.add(1, Flow::signal(temps[2], add.outputs[0])).unwrap();
        flows.add(2, Flow::signal(add.inputs[0], temps[1])).unwrap();
        flows.add(2, Flow::signal(y.inputs[0], temps[2])).unwrap();
        let mut builder = MinRegInterconnectBuilder::default();
        builder
            .create_interconnect(&mut design, &mut DefaultDatapathBuilder::default(), &flows)
            .unwrap();
        assert_eq!(builder.registers().len(), 2);
    }

    #[test]
    fn reads_before_writes_are_rejected() {
        let Fixture {
            mut design,
            adder,
            temps,
            ..
        } = fixture();
        let add = design.unit(adder).clone();
        let mut flows = FlowMatrix::new();
        flows.add(0, Flow::signal(add.inputs[0], temps[1])).unwrap();
        flows.add(1, Flow::signal(temps[1], add.outputs[0])).unwrap();
        let result = MinRegInterconnectBuilder::default().create_interconnect(
            &mut design,
            &mut DefaultDatapathBuilder::default(),
            &flows,
        );
        assert!(matches!(result, Err(Error::Malformed(_))));
    }
}
