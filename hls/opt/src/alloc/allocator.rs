use super::{
    AllocationDecision, AllocationPolicy, Mapping, MapperRegistry, ReservationTable,
};
use hls_ir::{
    Design, FuClass, FuSpec, Function, Instr, InstrClass, InstrIdx, ResourceKind, UnitIdx,
};
use hls_utils::{Error, HlsResult};
use itertools::Itertools;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

/// The unit an instruction was bound to.
#[derive(Clone, Debug)]
pub struct Binding {
    pub instr: InstrIdx,
    pub cstep: i64,
    pub mapping: Mapping,
    /// Whether the unit was instantiated for this instruction.
    pub allocated: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnitStats {
    pub name: String,
    pub occupation: i64,
    pub utilization: f64,
}

/// Utilization of all units of one class.
#[derive(Clone, Debug, Serialize)]
pub struct ClassStats {
    pub class: FuClass,
    pub units: Vec<UnitStats>,
}

impl ClassStats {
    pub fn avg_utilization(&self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        self.units.iter().map(|u| u.utilization).sum::<f64>() / self.units.len() as f64
    }
}

impl fmt::Display for ClassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "FU type: {}, #{}, utilization: {:.1}%",
            self.class,
            self.units.len(),
            self.avg_utilization() * 100.0
        )?;
        for unit in &self.units {
            writeln!(
                f,
                "  {}: occupation = {}, utilization = {:.3}",
                unit.name, unit.occupation, unit.utilization
            )?;
        }
        Ok(())
    }
}

/// Binds scheduled instructions to functional units, sharing units where the
/// policy allows and the reservation tables have room.
pub struct Allocator {
    registry: MapperRegistry,
    policy: Box<dyn AllocationPolicy>,
    /// Units instantiated through each mapper.
    bound: Vec<Vec<UnitIdx>>,
    tables: BTreeMap<UnitIdx, ReservationTable<InstrIdx>>,
    bindings: BTreeMap<InstrIdx, Binding>,
}

impl Allocator {
    pub fn new(registry: MapperRegistry, policy: Box<dyn AllocationPolicy>) -> Self {
        Self {
            bound: vec![Vec::new(); registry.len()],
            registry,
            policy,
            tables: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    pub fn spec(&self, instr: &Instr) -> HlsResult<FuSpec> {
        self.registry.spec(instr)
    }

    /// Instructions of equal class compete for the same units. Exclusive
    /// resources are told apart by the variable or port they access.
    pub fn classify(&self, instr: &Instr) -> HlsResult<InstrClass> {
        let spec = self.spec(instr)?;
        let key = match spec.resource {
            ResourceKind::Exclusive => instr.opcode.resource_key().map(String::from),
            ResourceKind::Shared | ResourceKind::Lightweight => None,
        };
        Ok(InstrClass {
            class: spec.class,
            key,
        })
    }

    /// Chooses a unit for `instr` issued in `cstep` and reserves it for the
    /// initiation interval. Fails when an exclusive unit is busy or no mapper
    /// can execute the instruction.
    pub fn try_bind(
        &mut self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        cstep: i64,
    ) -> HlsResult<Binding> {
        let library = self.registry.library();
        let mappers = self.registry.lookup(instr.opcode.kind()).to_vec();
        let mut viable = Vec::new();
        for id in &mappers {
            let mapper = self.registry.mapper(*id);
            for unit in &self.bound[MapperRegistry::index(*id)] {
                for mapping in mapper.try_map(design, *unit, instr, func, library) {
                    let ii = mapping.spec.initiation_interval;
                    let busy = ii > 0
                        && self
                            .tables
                            .get(unit)
                            .is_some_and(|t| t.is_reserved(cstep, cstep + ii - 1));
                    if !busy {
                        viable.push(mapping);
                    } else if mapping.spec.resource == ResourceKind::Exclusive {
                        return Err(Error::mapping(format!(
                            "{} is busy in c-step {cstep}, needed by instruction {}",
                            design.unit(*unit).name,
                            instr.index
                        )));
                    }
                }
            }
        }

        let latency = viable.first().map(|m: &Mapping| m.spec.latency);
        let mut best = None;
        let mut allocate_new = true;
        if let Some(latency) = latency {
            if viable.iter().any(|m| m.spec.latency != latency) {
                return Err(Error::mapping(format!(
                    "mappings with different latencies exist for instruction {}",
                    instr.index
                )));
            }
            if viable
                .iter()
                .all(|m| m.spec.resource == ResourceKind::Exclusive)
            {
                allocate_new = false;
                best = Some(viable.swap_remove(0));
            } else if !viable
                .iter()
                .all(|m| m.spec.resource == ResourceKind::Lightweight)
            {
                let (decision, i) =
                    self.policy
                        .select_best_mapping(design, instr, func, cstep, &viable);
                allocate_new = decision == AllocationDecision::AllocateNew;
                best = Some(viable.swap_remove(i));
            }
        }

        let mut allocated = false;
        if allocate_new {
            for id in &mappers {
                let mapper = self.registry.mapper(*id);
                let Some(unit) = mapper.try_allocate(design, instr, func, library) else {
                    continue;
                };
                let mapping = mapper
                    .try_map(design, unit, instr, func, library)
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::mapping(format!(
                            "{} cannot execute the instruction {} it was allocated for",
                            design.unit(unit).name,
                            instr.index
                        ))
                    })?;
                if latency.is_some_and(|l| l != mapping.spec.latency) {
                    return Err(Error::mapping(format!(
                        "new unit for instruction {} has a different latency",
                        instr.index
                    )));
                }
                self.bound[MapperRegistry::index(*id)].push(unit);
                best = Some(mapping);
                allocated = true;
                break;
            }
        }

        let mapping = best.ok_or_else(|| {
            Error::mapping(format!("no unit can execute `{}'", instr.opcode))
        })?;
        let ii = mapping.spec.initiation_interval;
        let table = self.tables.entry(mapping.unit).or_default();
        if !table.try_reserve(cstep, cstep + ii - 1, instr.index) {
            return Err(Error::mapping(format!(
                "{} is already reserved in c-step {cstep}",
                design.unit(mapping.unit).name
            )));
        }
        Ok(Binding {
            instr: instr.index,
            cstep,
            mapping,
            allocated,
        })
    }

    /// Commits a binding and lets the policy learn from it.
    pub fn tell(&mut self, design: &mut Design, instr: &Instr, func: &Function, binding: Binding) {
        self.policy
            .tell_mapping(design, instr, func, binding.cstep, &binding.mapping);
        self.bindings.insert(binding.instr, binding);
    }

    pub fn binding(&self, instr: InstrIdx) -> Option<&Binding> {
        self.bindings.get(&instr)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn unit_of(&self, instr: InstrIdx) -> Option<UnitIdx> {
        self.binding(instr).map(|b| b.mapping.unit)
    }

    pub fn table(&self, unit: UnitIdx) -> Option<&ReservationTable<InstrIdx>> {
        self.tables.get(&unit)
    }

    /// Utilization of every unit over a schedule of `schedule_length` c-steps.
    pub fn unit_stats(&self, design: &Design, schedule_length: i64) -> Vec<ClassStats> {
        let mut by_class: BTreeMap<FuClass, Vec<UnitStats>> = BTreeMap::new();
        for (unit, table) in &self.tables {
            let u = design.unit(*unit);
            by_class.entry(u.class).or_default().push(UnitStats {
                name: u.name.clone(),
                occupation: table.occupation(),
                utilization: table.utilization(schedule_length),
            });
        }
        by_class
            .into_iter()
            .map(|(class, mut units)| {
                units.sort_by(|a, b| a.name.cmp(&b.name));
                ClassStats { class, units }
            })
            .collect()
    }

    /// One line per instruction, in c-step order.
    pub fn binding_report(&self, design: &Design, func: &Function) -> String {
        self.bindings
            .values()
            .sorted_by_key(|b| (b.cstep, b.instr))
            .map(|b| {
                format!(
                    "c-step {}: {} on {}{}",
                    b.cstep,
                    func.instr(b.instr),
                    design.unit(b.mapping.unit).name,
                    if b.allocated { " (new)" } else { "" }
                )
            })
            .join("\n")
    }
}
