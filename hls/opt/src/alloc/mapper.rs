use hls_ir::{
    CmpOp, Design, Expr, FuClass, FuSpec, Function, Instr, OpKind, Opcode, PortCounts,
    Process, ResourceKind, SignalIdx, UnitIdx, Value,
};
use hls_utils::{Error, HlsResult};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::collections::{BTreeMap, HashMap};

/// Latency and initiation interval of a functional-unit class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTiming {
    pub latency: i64,
    pub initiation_interval: i64,
}

impl UnitTiming {
    const fn new(latency: i64, initiation_interval: i64) -> Self {
        Self {
            latency,
            initiation_interval,
        }
    }

    fn builtin(class: FuClass) -> Self {
        match class {
            FuClass::Adder
            | FuClass::Logic
            | FuClass::Shifter
            | FuClass::Comparator
            | FuClass::Variable
            | FuClass::Register => Self::new(1, 1),
            FuClass::Multiplier => Self::new(3, 1),
            FuClass::Divider => Self::new(8, 8),
            FuClass::Mux | FuClass::Port | FuClass::Control => Self::new(0, 1),
            FuClass::Wire | FuClass::Constant => Self::new(0, 0),
        }
    }
}

/// Timing of the functional units available to allocation. Classes missing
/// from `units` use built-in values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FuLibrary {
    pub units: BTreeMap<FuClass, UnitTiming>,
}

impl FuLibrary {
    pub fn timing(&self, class: FuClass) -> UnitTiming {
        self.units
            .get(&class)
            .copied()
            .unwrap_or_else(|| UnitTiming::builtin(class))
    }

    fn spec(&self, class: FuClass, resource: ResourceKind) -> FuSpec {
        let timing = self.timing(class);
        FuSpec {
            class,
            latency: timing.latency,
            initiation_interval: timing.initiation_interval,
            resource,
        }
    }
}

/// How a [Mapping] drives its unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Realization {
    /// Operands go to the input ports, results are taken from the outputs
    /// once the latency has elapsed.
    Unit,
    /// The results are driven with a constant.
    Constant(i64),
    /// The results are driven directly by the operands.
    Wire,
}

/// One way of executing an instruction on a particular unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
    pub unit: UnitIdx,
    pub spec: FuSpec,
    /// Input port receiving each operand.
    pub operand_ports: SmallVec<[usize; 3]>,
    /// Value driven on the first control port while operands are applied.
    pub control: Option<i64>,
    pub realization: Realization,
}

impl Mapping {
    /// Behavior of the mapped instruction, one process per c-step from issue
    /// to completion. `sources` carry the operands, `sinks` receive the
    /// results.
    pub fn realize(&self, design: &Design, sources: &[SignalIdx], sinks: &[SignalIdx]) -> Vec<Process> {
        let latency = self.spec.latency.max(0) as usize;
        let mut verbs = vec![Process::new(); latency + 1];
        match self.realization {
            Realization::Constant(v) => {
                for sink in sinks {
                    verbs[0].store(*sink, Expr::Const(Value::Int(v)));
                }
            }
            Realization::Wire => {
                for (sink, source) in sinks.iter().zip(sources) {
                    verbs[0].store(*sink, Expr::Signal(*source));
                }
            }
            Realization::Unit => {
                let unit = design.unit(self.unit);
                // Non-pipelined units need their operands for a whole
                // initiation interval.
                let hold = self.spec.initiation_interval.clamp(1, latency as i64 + 1) as usize;
                for verb in &mut verbs[..hold] {
                    for (source, port) in sources.iter().zip(&self.operand_ports) {
                        verb.store(unit.inputs[*port], Expr::Signal(*source));
                    }
                    if let (Some(c), Some(ctl)) = (self.control, unit.controls.first()) {
                        verb.store(*ctl, Expr::Const(Value::Int(c)));
                    }
                }
                for (sink, output) in sinks.iter().zip(&unit.outputs) {
                    verbs[latency].store(*sink, Expr::Signal(*output));
                }
            }
        }
        verbs
    }
}

/// Maps instructions of some kinds onto one family of functional units.
pub trait Mapper {
    fn name(&self) -> &'static str;

    fn kinds(&self) -> Vec<OpKind>;

    fn spec(&self, instr: &Instr, library: &FuLibrary) -> FuSpec;

    /// Ways of executing `instr` on the existing `unit`. Empty when the unit
    /// cannot execute it.
    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping>;

    /// Instantiates a new unit able to execute `instr`.
    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        library: &FuLibrary,
    ) -> Option<UnitIdx>;
}

/// Widest slot touched by the instruction.
fn instr_width(instr: &Instr, func: &Function) -> u32 {
    instr
        .operands
        .iter()
        .chain(&instr.results)
        .map(|s| func.slot_width(*s))
        .max()
        .unwrap_or(1)
}

/// Arithmetic and logic units shared between instructions. A unit supporting
/// several operations selects one through its control port.
pub struct FuMapper {
    class: FuClass,
}

impl FuMapper {
    pub fn new(class: FuClass) -> Self {
        Self { class }
    }

    fn ops(&self) -> &'static [OpKind] {
        match self.class {
            FuClass::Adder => &[OpKind::Add, OpKind::Sub, OpKind::Neg],
            FuClass::Multiplier => &[OpKind::Mul],
            FuClass::Divider => &[OpKind::Div, OpKind::Rem],
            FuClass::Logic => &[OpKind::And, OpKind::Or, OpKind::Xor, OpKind::Not],
            FuClass::Shifter => &[OpKind::Shl, OpKind::Shr],
            FuClass::Comparator => &[OpKind::Cmp],
            FuClass::Mux => &[OpKind::Select],
            _ => &[],
        }
    }

    fn control(&self, opcode: &Opcode) -> Option<i64> {
        if let Opcode::Cmp(op) = opcode {
            let code = match op {
                CmpOp::Eq => 0,
                CmpOp::Ne => 1,
                CmpOp::Lt => 2,
                CmpOp::Le => 3,
                CmpOp::Gt => 4,
                CmpOp::Ge => 5,
            };
            return Some(code);
        }
        let ops = self.ops();
        (ops.len() > 1)
            .then(|| ops.iter().position(|k| *k == opcode.kind()))
            .flatten()
            .map(|p| p as i64)
    }

    fn ports(&self) -> PortCounts {
        PortCounts {
            inputs: if self.class == FuClass::Mux { 3 } else { 2 },
            outputs: 1,
            controls: usize::from(self.ops().len() > 1 || self.class == FuClass::Comparator),
        }
    }
}

impl Mapper for FuMapper {
    fn name(&self) -> &'static str {
        self.class.name()
    }

    fn kinds(&self) -> Vec<OpKind> {
        self.ops().to_vec()
    }

    fn spec(&self, _instr: &Instr, library: &FuLibrary) -> FuSpec {
        library.spec(self.class, ResourceKind::Shared)
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        let u = design.unit(unit);
        if u.class != self.class
            || !self.ops().contains(&instr.opcode.kind())
            || u.width != instr_width(instr, func)
        {
            return vec![];
        }
        let mapping = Mapping {
            unit,
            spec: self.spec(instr, library),
            operand_ports: (0..instr.operands.len()).collect(),
            control: self.control(&instr.opcode),
            realization: Realization::Unit,
        };
        if instr.opcode.is_commutative() && instr.operands.len() == 2 {
            let swapped = Mapping {
                operand_ports: smallvec![1, 0],
                ..mapping.clone()
            };
            vec![mapping, swapped]
        } else {
            vec![mapping]
        }
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        if !self.ops().contains(&instr.opcode.kind()) {
            return None;
        }
        Some(design.add_unit(
            self.class,
            None,
            instr_width(instr, func),
            self.ports(),
            ResourceKind::Shared,
        ))
    }
}

/// Constants are generated in place.
pub struct ConstMapper;

impl Mapper for ConstMapper {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn kinds(&self) -> Vec<OpKind> {
        vec![OpKind::Const]
    }

    fn spec(&self, _instr: &Instr, library: &FuLibrary) -> FuSpec {
        library.spec(FuClass::Constant, ResourceKind::Lightweight)
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        _func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        match instr.opcode {
            Opcode::Const(v) if design.unit(unit).class == FuClass::Constant => vec![Mapping {
                unit,
                spec: self.spec(instr, library),
                operand_ports: SmallVec::new(),
                control: None,
                realization: Realization::Constant(v),
            }],
            _ => vec![],
        }
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        matches!(instr.opcode, Opcode::Const(_)).then(|| {
            design.add_unit(
                FuClass::Constant,
                None,
                instr_width(instr, func),
                PortCounts::default(),
                ResourceKind::Lightweight,
            )
        })
    }
}

/// Moves are plain wires.
pub struct WireMapper;

impl Mapper for WireMapper {
    fn name(&self) -> &'static str {
        "wire"
    }

    fn kinds(&self) -> Vec<OpKind> {
        vec![OpKind::Mov]
    }

    fn spec(&self, _instr: &Instr, library: &FuLibrary) -> FuSpec {
        library.spec(FuClass::Wire, ResourceKind::Lightweight)
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        _func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        if instr.opcode != Opcode::Mov || design.unit(unit).class != FuClass::Wire {
            return vec![];
        }
        vec![Mapping {
            unit,
            spec: self.spec(instr, library),
            operand_ports: smallvec![0],
            control: None,
            realization: Realization::Wire,
        }]
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        (instr.opcode == Opcode::Mov).then(|| {
            design.add_unit(
                FuClass::Wire,
                None,
                instr_width(instr, func),
                PortCounts::default(),
                ResourceKind::Lightweight,
            )
        })
    }
}

/// Every process variable lives in its own register. Reads are free, writes
/// pulse the write enable on the control port.
pub struct VariableMapper;

impl Mapper for VariableMapper {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn kinds(&self) -> Vec<OpKind> {
        vec![OpKind::LoadVar, OpKind::StoreVar]
    }

    fn spec(&self, instr: &Instr, library: &FuLibrary) -> FuSpec {
        match instr.opcode {
            Opcode::LoadVar(_) => FuSpec {
                class: FuClass::Variable,
                latency: 0,
                initiation_interval: 0,
                resource: ResourceKind::Exclusive,
            },
            _ => library.spec(FuClass::Variable, ResourceKind::Exclusive),
        }
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        _func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        let u = design.unit(unit);
        if u.class != FuClass::Variable || u.key.as_deref() != instr.opcode.resource_key() {
            return vec![];
        }
        let mapping = match instr.opcode {
            Opcode::LoadVar(_) => Mapping {
                unit,
                spec: self.spec(instr, library),
                operand_ports: SmallVec::new(),
                control: None,
                realization: Realization::Unit,
            },
            Opcode::StoreVar(_) => Mapping {
                unit,
                spec: self.spec(instr, library),
                operand_ports: smallvec![0],
                control: Some(1),
                realization: Realization::Unit,
            },
            _ => return vec![],
        };
        vec![mapping]
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        let (Opcode::LoadVar(name) | Opcode::StoreVar(name)) = &instr.opcode else {
            return None;
        };
        Some(design.add_unit(
            FuClass::Variable,
            Some(name.clone()),
            instr_width(instr, func),
            PortCounts {
                inputs: 1,
                outputs: 1,
                controls: 1,
            },
            ResourceKind::Exclusive,
        ))
    }
}

/// Process ports. Reading samples the port, writing drives it for one c-step.
pub struct PortMapper;

impl Mapper for PortMapper {
    fn name(&self) -> &'static str {
        "port"
    }

    fn kinds(&self) -> Vec<OpKind> {
        vec![OpKind::ReadPort, OpKind::WritePort]
    }

    fn spec(&self, instr: &Instr, library: &FuLibrary) -> FuSpec {
        match instr.opcode {
            Opcode::ReadPort(_) => FuSpec {
                class: FuClass::Port,
                latency: 0,
                initiation_interval: 0,
                resource: ResourceKind::Exclusive,
            },
            _ => library.spec(FuClass::Port, ResourceKind::Exclusive),
        }
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        _func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        let u = design.unit(unit);
        if u.class != FuClass::Port || u.key.as_deref() != instr.opcode.resource_key() {
            return vec![];
        }
        let operand_ports = match instr.opcode {
            Opcode::ReadPort(_) => SmallVec::new(),
            Opcode::WritePort(_) => smallvec![0],
            _ => return vec![],
        };
        vec![Mapping {
            unit,
            spec: self.spec(instr, library),
            operand_ports,
            control: None,
            realization: Realization::Unit,
        }]
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        let (Opcode::ReadPort(name) | Opcode::WritePort(name)) = &instr.opcode else {
            return None;
        };
        Some(design.add_unit(
            FuClass::Port,
            Some(name.clone()),
            instr_width(instr, func),
            PortCounts {
                inputs: 1,
                outputs: 1,
                controls: 0,
            },
            ResourceKind::Exclusive,
        ))
    }
}

/// The single control unit executing jumps. Conditions are fed to its input.
pub struct ControlMapper;

impl Mapper for ControlMapper {
    fn name(&self) -> &'static str {
        "control"
    }

    fn kinds(&self) -> Vec<OpKind> {
        vec![
            OpKind::Goto,
            OpKind::BranchIfTrue,
            OpKind::BranchIfFalse,
            OpKind::Nop,
        ]
    }

    fn spec(&self, instr: &Instr, library: &FuLibrary) -> FuSpec {
        match instr.opcode {
            Opcode::BranchIfTrue(_) | Opcode::BranchIfFalse(_) => {
                library.spec(FuClass::Control, ResourceKind::Exclusive)
            }
            _ => FuSpec {
                class: FuClass::Control,
                latency: 0,
                initiation_interval: 0,
                resource: ResourceKind::Exclusive,
            },
        }
    }

    fn try_map(
        &self,
        design: &Design,
        unit: UnitIdx,
        instr: &Instr,
        _func: &Function,
        library: &FuLibrary,
    ) -> Vec<Mapping> {
        if design.unit(unit).class != FuClass::Control || !self.kinds().contains(&instr.opcode.kind()) {
            return vec![];
        }
        vec![Mapping {
            unit,
            spec: self.spec(instr, library),
            operand_ports: (0..instr.operands.len()).collect(),
            control: None,
            realization: Realization::Unit,
        }]
    }

    fn try_allocate(
        &self,
        design: &mut Design,
        instr: &Instr,
        _func: &Function,
        _library: &FuLibrary,
    ) -> Option<UnitIdx> {
        if !self.kinds().contains(&instr.opcode.kind()) {
            return None;
        }
        Some(design.add_unit(
            FuClass::Control,
            None,
            1,
            PortCounts {
                inputs: 1,
                outputs: 0,
                controls: 0,
            },
            ResourceKind::Exclusive,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapperId(usize);

/// All mappers, looked up by instruction kind.
pub struct MapperRegistry {
    mappers: Vec<Box<dyn Mapper>>,
    lookup: HashMap<OpKind, Vec<MapperId>>,
    library: FuLibrary,
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_library(FuLibrary::default())
    }
}

impl MapperRegistry {
    /// A registry with the standard mappers and built-in timing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: FuLibrary) -> Self {
        let mut registry = Self {
            mappers: Vec::new(),
            lookup: HashMap::new(),
            library,
        };
        for class in [
            FuClass::Adder,
            FuClass::Multiplier,
            FuClass::Divider,
            FuClass::Logic,
            FuClass::Shifter,
            FuClass::Comparator,
            FuClass::Mux,
        ] {
            registry.register(Box::new(FuMapper::new(class)));
        }
        registry.register(Box::new(ConstMapper));
        registry.register(Box::new(WireMapper));
        registry.register(Box::new(VariableMapper));
        registry.register(Box::new(PortMapper));
        registry.register(Box::new(ControlMapper));
        registry
    }

    pub fn register(&mut self, mapper: Box<dyn Mapper>) -> MapperId {
        let id = MapperId(self.mappers.len());
        for kind in mapper.kinds() {
            self.lookup.entry(kind).or_default().push(id);
        }
        self.mappers.push(mapper);
        id
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    pub fn lookup(&self, kind: OpKind) -> &[MapperId] {
        self.lookup.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn mapper(&self, id: MapperId) -> &dyn Mapper {
        self.mappers[id.0].as_ref()
    }

    pub fn library(&self) -> &FuLibrary {
        &self.library
    }

    /// Timing and resource kind of the first mapper able to execute `instr`.
    pub fn spec(&self, instr: &Instr) -> HlsResult<FuSpec> {
        self.lookup(instr.opcode.kind())
            .first()
            .map(|id| self.mapper(*id).spec(instr, &self.library))
            .ok_or_else(|| Error::mapping(format!("no mapper for `{}'", instr.opcode)))
    }

    pub(crate) fn index(id: MapperId) -> usize {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hls_ir::Stmt;

    fn adder_func() -> Function {
        Function::new(
            "f",
            vec![16, 16, 16, 16],
            vec![
                Instr::new(Opcode::ReadPort("a".into()), &[], &[0]),
                Instr::new(Opcode::ReadPort("b".into()), &[], &[1]),
                Instr::new(Opcode::Add, &[0, 1], &[2]),
                Instr::new(Opcode::Sub, &[0, 1], &[3]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn commutative_ops_offer_both_orders() {
        let func = adder_func();
        let registry = MapperRegistry::new();
        let mut design = Design::new();
        let [id] = registry.lookup(OpKind::Add) else {
            panic!("expected a single adder mapper");
        };
        let mapper = registry.mapper(*id);
        let unit = mapper
            .try_allocate(&mut design, &func.instrs[2], &func, registry.library())
            .unwrap();
        let add = mapper.try_map(&design, unit, &func.instrs[2], &func, registry.library());
        assert_eq!(add.len(), 2);
        assert_eq!(add[1].operand_ports.as_slice(), &[1, 0]);
        assert_eq!(add[0].control, Some(0));
        let sub = mapper.try_map(&design, unit, &func.instrs[3], &func, registry.library());
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].control, Some(1));
    }

    #[test]
    fn realization_spans_latency() {
        let func = adder_func();
        let mut library = FuLibrary::default();
        library.units.insert(
            FuClass::Adder,
            UnitTiming {
                latency: 2,
                initiation_interval: 1,
            },
        );
        let registry = MapperRegistry::with_library(library);
        let mut design = Design::new();
        let mapper = registry.mapper(registry.lookup(OpKind::Sub)[0]);
        let unit = mapper
            .try_allocate(&mut design, &func.instrs[3], &func, registry.library())
            .unwrap();
        let mapping = &mapper.try_map(&design, unit, &func.instrs[3], &func, registry.library())[0];
        let a = design.add_interlink(0usize.into(), 16);
        let b = design.add_interlink(1usize.into(), 16);
        let r = design.add_interlink(3usize.into(), 16);
        let verbs = mapping.realize(&design, &[a, b], &[r]);
        assert_eq!(verbs.len(), 3);
        let u = design.unit(unit);
        assert_eq!(
            verbs[0].stmts,
            vec![
                Stmt::Store {
                    target: u.inputs[0],
                    value: Expr::Signal(a)
                },
                Stmt::Store {
                    target: u.inputs[1],
                    value: Expr::Signal(b)
                },
                Stmt::Store {
                    target: u.controls[0],
                    value: Expr::Const(Value::Int(1))
                },
            ]
        );
        assert!(verbs[1].is_empty());
        assert_eq!(
            verbs[2].stmts,
            vec![Stmt::Store {
                target: r,
                value: Expr::Signal(u.outputs[0])
            }]
        );
    }

    #[test]
    fn variables_are_keyed_by_name() {
        let func = Function::new(
            "f",
            vec![8, 8],
            vec![
                Instr::new(Opcode::LoadVar("x".into()), &[], &[0]),
                Instr::new(Opcode::LoadVar("y".into()), &[], &[1]),
            ],
        )
        .unwrap();
        let registry = MapperRegistry::new();
        let mapper = registry.mapper(registry.lookup(OpKind::LoadVar)[0]);
        let mut design = Design::new();
        let x = mapper
            .try_allocate(&mut design, &func.instrs[0], &func, registry.library())
            .unwrap();
        assert_eq!(design.unit(x).name, "variable_x");
        assert_eq!(mapper.try_map(&design, x, &func.instrs[0], &func, registry.library()).len(), 1);
        assert!(mapper.try_map(&design, x, &func.instrs[1], &func, registry.library()).is_empty());
        assert_eq!(registry.spec(&func.instrs[0]).unwrap().initiation_interval, 0);
    }

    #[test]
    fn library_overrides_builtin_timing() {
        let library: FuLibrary = serde_json::from_str(
            r#"{"units": {"multiplier": {"latency": 5, "initiation_interval": 2}}}"#,
        )
        .unwrap();
        assert_eq!(library.timing(FuClass::Multiplier), UnitTiming::new(5, 2));
        assert_eq!(library.timing(FuClass::Divider), UnitTiming::new(8, 8));
    }
}
