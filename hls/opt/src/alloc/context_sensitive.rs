use super::{AllocationDecision, AllocationPolicy, Mapping};
use hls_ir::{Design, FuClass, Function, Instr, ParFlow, Process, SignalIdx, SlotIdx, UnitIdx};
use hls_utils::{IndexedMap, impl_index};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InterlinkIdx(u32);
impl_index!(InterlinkIdx);

/// Stand-in for the wire carrying a value slot while units are chosen.
#[derive(Clone, Debug)]
pub struct Interlink {
    pub slot: SlotIdx,
    pub signal: SignalIdx,
    /// Unit output currently producing the value.
    pub driver: Option<SignalIdx>,
    /// C-step in which `driver` started producing the value.
    pub drive_time: i64,
}

/// Shares a unit only when the multiplexers this creates stay cheap.
///
/// Every unit input remembers the drivers it has been connected to, together
/// with the smallest slack between a driver producing a value and the input
/// consuming it. Connecting a driver with little slack to an input that
/// already has many drivers is expensive. When the cheapest existing unit
/// costs more than `max_cost` and the class is below its limit, a new unit is
/// allocated.
#[derive(Debug)]
pub struct ContextSensitiveAllocation {
    pub max_cost: f64,
    /// Units allowed per class. Classes without an entry are unlimited.
    pub fu_limits: HashMap<FuClass, usize>,
    interlinks: IndexedMap<InterlinkIdx, Interlink>,
    by_slot: HashMap<SlotIdx, InterlinkIdx>,
    by_signal: HashMap<SignalIdx, InterlinkIdx>,
    fan_in: HashMap<SignalIdx, BTreeMap<SignalIdx, i64>>,
    fu_count: HashMap<FuClass, BTreeSet<UnitIdx>>,
}

impl Default for ContextSensitiveAllocation {
    fn default() -> Self {
        Self::new(2.0, HashMap::new())
    }
}

fn penalty(slack: i64) -> f64 {
    (-(slack as f64)).exp2()
}

fn combinational_flows(verb: &Process) -> ParFlow {
    ParFlow::extract(verb).unwrap_or_else(|e| {
        log::debug!("skipping procedural verb: {e}");
        ParFlow::new()
    })
}

impl ContextSensitiveAllocation {
    pub fn new(max_cost: f64, fu_limits: HashMap<FuClass, usize>) -> Self {
        Self {
            max_cost,
            fu_limits,
            interlinks: IndexedMap::new(),
            by_slot: HashMap::new(),
            by_signal: HashMap::new(),
            fan_in: HashMap::new(),
            fu_count: HashMap::new(),
        }
    }

    fn interlink(&mut self, design: &mut Design, func: &Function, slot: SlotIdx) -> SignalIdx {
        if let Some(idx) = self.by_slot.get(&slot) {
            return self.interlinks[*idx].signal;
        }
        let signal = design.add_interlink(slot, func.slot_width(slot));
        let idx = self.interlinks.push(Interlink {
            slot,
            signal,
            driver: None,
            drive_time: 0,
        });
        self.by_slot.insert(slot, idx);
        self.by_signal.insert(signal, idx);
        signal
    }

    fn endpoints(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
    ) -> (Vec<SignalIdx>, Vec<SignalIdx>) {
        let sources = instr
            .operands
            .iter()
            .map(|s| self.interlink(design, func, *s))
            .collect();
        let sinks = instr
            .results
            .iter()
            .map(|s| self.interlink(design, func, *s))
            .collect();
        (sources, sinks)
    }

    fn cost(&self, design: &Design, mapping: &Mapping, sources: &[SignalIdx], sinks: &[SignalIdx], cstep: i64) -> f64 {
        let mut cost = 0.0;
        for (offset, verb) in mapping.realize(design, sources, sinks).iter().enumerate() {
            let now = cstep + offset as i64;
            for flow in combinational_flows(verb).flows() {
                let Some(source) = flow.source() else {
                    continue;
                };
                if self.by_signal.contains_key(&flow.target) {
                    continue;
                }
                let Some(link) = self.by_signal.get(&source).map(|i| &self.interlinks[*i]) else {
                    continue;
                };
                let Some(driver) = link.driver else {
                    continue;
                };
                if let Some(fan_in) = self.fan_in.get(&flow.target) {
                    cost += fan_in.values().map(|v| penalty(*v)).sum::<f64>();
                    if let Some(prev) = fan_in.get(&driver) {
                        cost -= penalty(*prev);
                    }
                }
                cost += penalty(now - link.drive_time);
            }
        }
        cost / sources.len().max(1) as f64
    }

    pub fn interlink_of(&self, slot: SlotIdx) -> Option<&Interlink> {
        self.by_slot.get(&slot).map(|i| &self.interlinks[*i])
    }

    /// Drivers seen by a unit input and their minimal slack.
    pub fn fan_in(&self, target: SignalIdx) -> Option<&BTreeMap<SignalIdx, i64>> {
        self.fan_in.get(&target)
    }

    /// Number of units of `class` bound so far.
    pub fn allocated(&self, class: FuClass) -> usize {
        self.fu_count.get(&class).map_or(0, BTreeSet::len)
    }
}

impl AllocationPolicy for ContextSensitiveAllocation {
    fn select_best_mapping(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        cstep: i64,
        mappings: &[Mapping],
    ) -> (AllocationDecision, usize) {
        let (sources, sinks) = self.endpoints(design, instr, func);
        let (best, best_cost) = mappings
            .iter()
            .enumerate()
            .map(|(i, m)| (i, self.cost(design, m, &sources, &sinks, cstep)))
            .fold((0, f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc });

        let class = mappings[best].spec.class;
        let limit = self.fu_limits.get(&class).copied().unwrap_or(usize::MAX);
        let count = self.allocated(class);
        let decision = if count < limit && best_cost > self.max_cost {
            AllocationDecision::AllocateNew
        } else {
            if best_cost > self.max_cost {
                log::debug!("{class} limit of {limit} reached, sharing despite cost {best_cost:.3}");
            }
            AllocationDecision::UseExisting
        };
        log::debug!(
            "instruction {}: best mapping {best} on {} costs {best_cost:.3}, {decision:?}",
            instr.index,
            design.unit(mappings[best].unit).name
        );
        (decision, best)
    }

    fn tell_mapping(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        cstep: i64,
        mapping: &Mapping,
    ) {
        let (sources, sinks) = self.endpoints(design, instr, func);
        for (offset, verb) in mapping.realize(design, &sources, &sinks).iter().enumerate() {
            let now = cstep + offset as i64;
            for flow in combinational_flows(verb).flows() {
                let Some(source) = flow.source() else {
                    continue;
                };
                if let Some(idx) = self.by_signal.get(&flow.target) {
                    let link = &mut self.interlinks[*idx];
                    link.driver = Some(source);
                    link.drive_time = now;
                } else if let Some(idx) = self.by_signal.get(&source) {
                    let link = &self.interlinks[*idx];
                    let Some(driver) = link.driver else {
                        continue;
                    };
                    let slack = now - link.drive_time;
                    let entry = self
                        .fan_in
                        .entry(flow.target)
                        .or_default()
                        .entry(driver)
                        .or_insert(slack);
                    *entry = (*entry).min(slack);
                }
            }
        }
        self.fu_count
            .entry(mapping.spec.class)
            .or_default()
            .insert(mapping.unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::MapperRegistry;
    use hls_ir::{Opcode, OpKind};

    struct Fixture {
        func: Function,
        registry: MapperRegistry,
        design: Design,
        policy: ContextSensitiveAllocation,
    }

    impl Fixture {
        fn new(policy: ContextSensitiveAllocation) -> Self {
            let func = Function::new(
                "f",
                vec![8; 5],
                vec![
                    Instr::new(Opcode::ReadPort("a".into()), &[], &[0]),
                    Instr::new(Opcode::ReadPort("b".into()), &[], &[1]),
                    Instr::new(Opcode::Add, &[0, 1], &[2]),
                    Instr::new(Opcode::ReadPort("c".into()), &[], &[3]),
                    Instr::new(Opcode::Add, &[3, 1], &[4]),
                ],
            )
            .unwrap();
            Self {
                func,
                registry: MapperRegistry::new(),
                design: Design::new(),
                policy,
            }
        }

        /// Allocates a fresh unit for instruction `i` and tells the policy.
        fn bind_new(&mut self, i: usize, cstep: i64) -> UnitIdx {
            let instr = &self.func.instrs[i];
            let mapper = self.registry.mapper(self.registry.lookup(instr.opcode.kind())[0]);
            let unit = mapper
                .try_allocate(&mut self.design, instr, &self.func, self.registry.library())
                .unwrap();
            let mapping = mapper.try_map(&self.design, unit, instr, &self.func, self.registry.library())
                .remove(0);
            self.policy
                .tell_mapping(&mut self.design, instr, &self.func, cstep, &mapping);
            unit
        }

        fn candidates(&self, i: usize, unit: UnitIdx) -> Vec<Mapping> {
            let instr = &self.func.instrs[i];
            let mapper = self.registry.mapper(self.registry.lookup(OpKind::Add)[0]);
            mapper.try_map(&self.design, unit, instr, &self.func, self.registry.library())
        }

        fn select(&mut self, i: usize, cstep: i64, mappings: &[Mapping]) -> (AllocationDecision, usize) {
            let instr = &self.func.instrs[i];
            self.policy
                .select_best_mapping(&mut self.design, instr, &self.func, cstep, mappings)
        }
    }

    fn prepared(policy: ContextSensitiveAllocation) -> (Fixture, UnitIdx) {
        let mut fx = Fixture::new(policy);
        fx.bind_new(0, 0);
        fx.bind_new(1, 0);
        fx.bind_new(3, 0);
        let adder = fx.bind_new(2, 1);
        (fx, adder)
    }

    #[test]
    fn prefers_the_operand_order_matching_existing_wiring() {
        let (mut fx, adder) = prepared(ContextSensitiveAllocation::default());
        let candidates = fx.candidates(4, adder);
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            fx.select(4, 2, &candidates),
            (AllocationDecision::UseExisting, 0)
        );
        let b_port = fx.design.unit(adder).inputs[1];
        assert_eq!(fx.policy.fan_in(b_port).map(|f| f.len()), Some(1));
        assert_eq!(fx.policy.allocated(FuClass::Adder), 1);
    }

    #[test]
    fn expensive_sharing_allocates_until_the_limit() {
        let (mut fx, adder) = prepared(ContextSensitiveAllocation::new(0.1, HashMap::new()));
        let candidates = fx.candidates(4, adder);
        assert_eq!(fx.select(4, 2, &candidates).0, AllocationDecision::AllocateNew);

        let limits = HashMap::from([(FuClass::Adder, 1)]);
        let (mut fx, adder) = prepared(ContextSensitiveAllocation::new(0.1, limits));
        let candidates = fx.candidates(4, adder);
        assert_eq!(fx.select(4, 2, &candidates).0, AllocationDecision::UseExisting);
    }

    #[test]
    fn identical_histories_give_identical_state() {
        let replay = || {
            let (mut fx, adder) = prepared(ContextSensitiveAllocation::default());
            let candidates = fx.candidates(4, adder);
            let choice = fx.select(4, 2, &candidates);
            let instr = &fx.func.instrs[4];
            fx.policy
                .tell_mapping(&mut fx.design, instr, &fx.func, 2, &candidates[choice.1]);
            (fx, adder, choice)
        };
        let (a, adder_a, choice_a) = replay();
        let (b, adder_b, choice_b) = replay();
        assert_eq!(choice_a, choice_b);
        assert_eq!(adder_a, adder_b);
        for (signal, _) in a.design.signals.iter() {
            assert_eq!(a.policy.fan_in(signal), b.policy.fan_in(signal));
        }
        for slot in 0..a.func.slots.len() {
            let link = |fx: &Fixture| {
                fx.policy
                    .interlink_of(slot.into())
                    .map(|l| (l.signal, l.driver, l.drive_time))
            };
            assert_eq!(link(&a), link(&b));
        }
        assert!(a.policy.fan_in(a.design.unit(adder_a).inputs[1]).is_some());
        for class in [FuClass::Adder, FuClass::Port] {
            assert_eq!(a.policy.allocated(class), b.policy.allocated(class));
        }
    }

    #[test]
    fn results_drive_their_interlinks() {
        let (fx, adder) = prepared(ContextSensitiveAllocation::default());
        let link = fx.policy.interlink_of(2usize.into()).unwrap();
        assert_eq!(link.driver, Some(fx.design.unit(adder).outputs[0]));
        assert_eq!(link.drive_time, 2);
    }
}
