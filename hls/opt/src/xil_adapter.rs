use crate::{
    DatapathBuilder, Transition, TransitionKind,
    alloc::Allocator,
    schedule::{
        BlockLayout, BlockSpan, PinResult, ScheduleDependency, SchedulingAdapter, UNBOUNDED,
    },
};
use hls_ir::{
    ControlFlowGraph, Design, FlowMatrix, FuClass, FuSpec, Function, InstrClass, InstrDep,
    InstrIdx, Opcode, ParFlow, ResourceKind, SignalIdx, SlotIdx,
};
use hls_utils::{Error, HlsResult, IndexRef};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Write,
};

/// Variable or port touched by a load, store or port access, and whether the
/// access writes.
fn access(opcode: &Opcode) -> Option<((FuClass, &str), bool)> {
    match opcode {
        Opcode::LoadVar(n) => Some(((FuClass::Variable, n.as_str()), false)),
        Opcode::StoreVar(n) => Some(((FuClass::Variable, n.as_str()), true)),
        Opcode::ReadPort(n) => Some(((FuClass::Port, n.as_str()), false)),
        Opcode::WritePort(n) => Some(((FuClass::Port, n.as_str()), true)),
        _ => None,
    }
}

/// Schedules the instructions of a [Function] and binds them to units.
///
/// Dependencies are derived from the dataflow, the explicit instruction
/// dependencies and the order of accesses to variables and ports. Only
/// dependencies inside a basic block are kept; blocks are sequenced by
/// [FunctionScheduler](crate::schedule::FunctionScheduler).
pub struct XilSchedulingAdapter<'a> {
    func: &'a Function,
    cfg: ControlFlowGraph,
    allocator: Allocator,
    specs: Vec<FuSpec>,
    classes: Vec<InstrClass>,
    preds: Vec<Vec<ScheduleDependency<InstrIdx>>>,
    succs: Vec<Vec<ScheduleDependency<InstrIdx>>>,
    operands: Vec<Vec<usize>>,
    results: Vec<Vec<usize>>,
    csteps: Vec<Option<i64>>,
    max_fus: HashMap<FuClass, usize>,
    minimize_fus: bool,
    occupancy: HashMap<(InstrClass, i64), usize>,
}

impl<'a> XilSchedulingAdapter<'a> {
    pub fn new(func: &'a Function, allocator: Allocator) -> HlsResult<Self> {
        let cfg = ControlFlowGraph::build(func);
        let specs = func
            .iter()
            .map(|i| allocator.spec(i))
            .collect::<HlsResult<Vec<_>>>()?;
        let classes = func
            .iter()
            .zip(&specs)
            .map(|(instr, spec)| match spec.resource {
                // Every lightweight instruction gets a unit of its own.
                ResourceKind::Lightweight => Ok(InstrClass {
                    class: spec.class,
                    key: Some(format!("#{}", instr.index)),
                }),
                _ => allocator.classify(instr),
            })
            .collect::<HlsResult<Vec<_>>>()?;

        let mut adapter = Self {
            func,
            cfg,
            allocator,
            specs,
            classes,
            preds: vec![Vec::new(); func.len()],
            succs: vec![Vec::new(); func.len()],
            operands: func
                .iter()
                .map(|i| i.operands.iter().map(SlotIdx::index).collect())
                .collect(),
            results: func
                .iter()
                .map(|i| i.results.iter().map(SlotIdx::index).collect())
                .collect(),
            csteps: vec![None; func.len()],
            max_fus: HashMap::new(),
            minimize_fus: false,
            occupancy: HashMap::new(),
        };
        adapter.derive_dependencies()?;
        Ok(adapter)
    }

    fn derive_dependencies(&mut self) -> HlsResult<()> {
        let func = self.func;
        let producers = func.producers();
        let lat = |i: InstrIdx| self.specs[i.index()].latency.max(0);
        let mut all_preds = Vec::with_capacity(func.len());
        for instr in func.iter() {
            let i = instr.index;
            let block = self.cfg.block(self.cfg.block_of(i));
            let mut deps = Vec::new();
            for dep in &instr.deps {
                deps.push(match *dep {
                    InstrDep::BeginAfter { pred } => ScheduleDependency::after(pred, lat(pred)),
                    InstrDep::CompleteAfter { pred } => {
                        ScheduleDependency::after(pred, (lat(pred) - lat(i)).max(0))
                    }
                    InstrDep::Time {
                        pred,
                        min_delay,
                        max_delay,
                    } => ScheduleDependency::new(pred, min_delay, max_delay.min(UNBOUNDED)),
                });
            }
            for slot in &instr.operands {
                if let Some(p) = producers.get(slot) {
                    deps.push(ScheduleDependency::after(*p, lat(*p)));
                }
            }
            if instr.opcode.is_branch() && block.last() == i {
                deps.extend(
                    block
                        .instrs()
                        .filter(|p| *p != i)
                        .map(|p| ScheduleDependency::after(p, lat(p))),
                );
            }
            if let Some((resource, writes)) = access(&instr.opcode) {
                for p in block.instrs().take_while(|p| *p != i) {
                    let Some((other, earlier_writes)) = access(&func.instr(p).opcode) else {
                        continue;
                    };
                    if other == resource && (writes || earlier_writes) {
                        let min = if earlier_writes { lat(p).max(1) } else { 0 };
                        deps.push(ScheduleDependency::after(p, min));
                    }
                }
            }

            let mut merged: BTreeMap<InstrIdx, (i64, i64)> = BTreeMap::new();
            for dep in deps {
                if dep.task >= i || !block.contains(dep.task) {
                    continue;
                }
                let window = merged.entry(dep.task).or_insert((0, UNBOUNDED));
                window.0 = window.0.max(dep.min_delay);
                window.1 = window.1.min(dep.max_delay);
            }
            let mut preds = Vec::with_capacity(merged.len());
            for (p, (min, max)) in merged {
                if min > max {
                    return Err(Error::infeasible(format!(
                        "instruction {i} needs at least {min} and at most {max} c-steps after instruction {p}"
                    )));
                }
                preds.push(ScheduleDependency::new(p, min, max));
            }
            all_preds.push(preds);
        }

        for (i, preds) in all_preds.iter().enumerate() {
            for dep in preds {
                self.succs[dep.task.index()].push(dep.with_task(InstrIdx::new(i)));
            }
        }
        self.preds = all_preds;
        Ok(())
    }

    /// Caps the number of units of a shared class.
    pub fn set_max_fu_allocation(&mut self, class: FuClass, count: usize) {
        self.max_fus.insert(class, count);
    }

    pub fn set_minimize_fus(&mut self, minimize: bool) {
        self.minimize_fus = minimize;
    }

    /// Classes of units that instructions may share.
    pub fn shared_classes(&self) -> BTreeSet<FuClass> {
        self.specs
            .iter()
            .filter(|s| s.resource == ResourceKind::Shared)
            .map(|s| s.class)
            .collect()
    }

    pub fn func(&self) -> &'a Function {
        self.func
    }

    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn spec(&self, instr: InstrIdx) -> FuSpec {
        self.specs[instr.index()]
    }

    /// Results are transferred one c-step after the latency has elapsed, so
    /// every block keeps that c-step before control leaves it.
    pub fn block_layouts(&self) -> Vec<BlockLayout<InstrIdx>> {
        self.cfg
            .blocks()
            .iter()
            .map(|b| BlockLayout {
                tasks: b.instrs().collect(),
                preds: self.cfg.forward_preds(b.index).collect(),
                drain: 1,
            })
            .collect()
    }

    pub fn tasks(&self) -> Vec<InstrIdx> {
        self.func.iter().map(|i| i.index).collect()
    }

    /// One past the last c-step in which some instruction is active.
    pub fn cstep_count(&self) -> usize {
        self.func
            .iter()
            .filter_map(|i| {
                self.csteps[i.index.index()]
                    .map(|c| c + self.specs[i.index.index()].latency.max(0) + 1)
            })
            .max()
            .map_or(0, |end| end.max(0) as usize)
    }

    fn limit(&self, instr: InstrIdx) -> Option<usize> {
        let spec = &self.specs[instr.index()];
        match spec.resource {
            ResourceKind::Exclusive => Some(1),
            ResourceKind::Shared if self.minimize_fus => Some(1),
            ResourceKind::Shared => self.max_fus.get(&spec.class).map(|n| (*n).max(1)),
            ResourceKind::Lightweight => None,
        }
    }

    fn is_busy(&self, class: &InstrClass, cstep: i64, ii: i64, limit: usize) -> bool {
        (cstep..cstep + ii).any(|t| {
            self.occupancy
                .get(&(class.clone(), t))
                .is_some_and(|n| *n >= limit)
        })
    }

    fn scheduled_cstep(&self, instr: InstrIdx) -> HlsResult<usize> {
        let cstep = self.csteps[instr.index()]
            .ok_or_else(|| Error::infeasible(format!("instruction {instr} is unscheduled")))?;
        usize::try_from(cstep)
            .map_err(|_| Error::malformed(format!("instruction {instr} is scheduled in c-step {cstep}")))
    }

    /// Binds every instruction, in c-step order, and records the resulting
    /// data movement. Operands and results travel through temporaries that
    /// the interconnect builder later resolves.
    pub fn allocate(
        &mut self,
        design: &mut Design,
        datapath: &mut dyn DatapathBuilder,
        cstep_count: usize,
    ) -> HlsResult<FlowMatrix> {
        let func = self.func;
        let mut flows = FlowMatrix::new();
        flows.reserve_csteps(cstep_count);
        let order = func
            .iter()
            .map(|i| Ok((self.scheduled_cstep(i.index)?, i.index)))
            .collect::<HlsResult<Vec<_>>>()?
            .into_iter()
            .sorted();

        let mut temporaries: HashMap<SlotIdx, SignalIdx> = HashMap::new();
        let mut temporary = |design: &mut Design, slot: SlotIdx| {
            *temporaries
                .entry(slot)
                .or_insert_with(|| design.add_temporary(slot, func.slot_width(slot)))
        };
        for (cstep, i) in order {
            let instr = func.instr(i);
            let binding = self.allocator.try_bind(design, instr, func, cstep as i64)?;
            let unit = binding.mapping.unit;
            if binding.allocated {
                flows.add_neutral(&design.do_nothing(unit));
                datapath.add_unit(design, unit);
            }
            let sources = instr
                .operands
                .iter()
                .map(|s| temporary(design, *s))
                .collect_vec();
            let sinks = instr
                .results
                .iter()
                .map(|s| temporary(design, *s))
                .collect_vec();
            let verbs = binding.mapping.realize(design, &sources, &sinks);
            if verbs.len() as i64 > binding.mapping.spec.latency.max(0) + 1 {
                return Err(Error::malformed(format!(
                    "realization of instruction {i} takes {} c-steps, latency is {}",
                    verbs.len(),
                    binding.mapping.spec.latency
                )));
            }
            let seq = verbs
                .iter()
                .map(ParFlow::extract)
                .collect::<HlsResult<Vec<_>>>()?;
            flows.add_seq(cstep, &seq)?;
            flows.append_comment(cstep, format!("{instr} on {}", design.unit(unit).name));
            log::debug!("c-step {cstep}: {instr} on {}", design.unit(unit).name);
            self.allocator.tell(design, instr, func, binding);
        }
        Ok(flows)
    }

    /// Control transfers between the scheduled blocks. Must be called after
    /// [allocate](Self::allocate): conditions are read from the control unit.
    pub fn transitions(&self, design: &Design, spans: &[BlockSpan]) -> HlsResult<Vec<Transition>> {
        let block_start = |b: usize| -> HlsResult<usize> {
            self.cfg
                .block(b)
                .instrs()
                .map(|i| self.scheduled_cstep(i))
                .process_results(|it| it.min())?
                .ok_or_else(|| Error::malformed(format!("block {b} is empty")))
        };
        let mut transitions = Vec::new();
        let blocks = self.cfg.blocks();
        for block in blocks {
            let last = self.func.instr(block.last());
            let next = blocks.get(block.index + 1);
            let fallthrough = next.map(|n| block_start(n.index)).transpose()?;
            let Some(target) = last.opcode.branch_target() else {
                // Blocks are not laid out in program order when some block
                // waits for a later one.
                let end = spans[block.index].end;
                if let (Some(next), Some(start)) = (next, fallthrough) {
                    if spans[next.index].start != end {
                        transitions.push(Transition {
                            cstep: (end - 1).max(0) as usize,
                            kind: TransitionKind::Goto,
                            target: start,
                            fallthrough: None,
                        });
                    }
                }
                continue;
            };
            let cstep = self.scheduled_cstep(last.index)?;
            let target = block_start(self.cfg.block_of(target))?;
            let kind = match last.opcode {
                Opcode::Goto(_) => TransitionKind::Goto,
                Opcode::BranchIfTrue(_) | Opcode::BranchIfFalse(_) => {
                    let unit = self.allocator.unit_of(last.index).ok_or_else(|| {
                        Error::malformed(format!("branch {} is not bound", last.index))
                    })?;
                    let cond = design.unit(unit).inputs.first().copied().ok_or_else(|| {
                        Error::malformed(format!("{} has no condition input", design.unit(unit).name))
                    })?;
                    TransitionKind::Branch {
                        cond,
                        when: matches!(last.opcode, Opcode::BranchIfTrue(_)),
                    }
                }
                _ => continue,
            };
            transitions.push(Transition {
                cstep,
                kind,
                target,
                fallthrough: match kind {
                    TransitionKind::Goto => None,
                    TransitionKind::Branch { .. } => fallthrough,
                },
            });
        }
        Ok(transitions)
    }

    /// Instructions grouped by c-step.
    pub fn schedule_report(&self) -> String {
        let mut out = String::new();
        let by_cstep = self
            .func
            .iter()
            .filter_map(|i| self.csteps[i.index.index()].map(|c| (c, i)))
            .into_group_map();
        for (cstep, instrs) in by_cstep.into_iter().sorted_by_key(|(c, _)| *c) {
            let _ = writeln!(out, "c-step {cstep}:");
            for instr in instrs {
                let _ = writeln!(
                    out,
                    "  {instr} [{}, latency {}]",
                    self.classes[instr.index.index()],
                    self.specs[instr.index.index()].latency
                );
            }
        }
        out
    }
}

impl SchedulingAdapter for XilSchedulingAdapter<'_> {
    type Task = InstrIdx;
    type Class = InstrClass;

    fn index(&self, task: InstrIdx) -> usize {
        task.index()
    }

    fn preds(&self, task: InstrIdx) -> &[ScheduleDependency<InstrIdx>] {
        &self.preds[task.index()]
    }

    fn succs(&self, task: InstrIdx) -> &[ScheduleDependency<InstrIdx>] {
        &self.succs[task.index()]
    }

    fn operands(&self, task: InstrIdx) -> &[usize] {
        &self.operands[task.index()]
    }

    fn results(&self, task: InstrIdx) -> &[usize] {
        &self.results[task.index()]
    }

    fn latency(&self, task: InstrIdx) -> i64 {
        self.specs[task.index()].latency
    }

    fn cstep(&self, task: InstrIdx) -> Option<i64> {
        self.csteps[task.index()]
    }

    fn set_cstep(&mut self, task: InstrIdx, cstep: i64) {
        self.csteps[task.index()] = Some(cstep);
    }

    fn iclass(&self, task: InstrIdx) -> InstrClass {
        self.classes[task.index()].clone()
    }

    fn try_pin(&mut self, task: InstrIdx, cstep: i64) -> PinResult {
        let ii = self.specs[task.index()].initiation_interval;
        let Some(limit) = self.limit(task).filter(|_| ii > 0) else {
            return PinResult::Pinned;
        };
        let class = self.classes[task.index()].clone();
        if !self.is_busy(&class, cstep, ii, limit) {
            for t in cstep..cstep + ii {
                *self.occupancy.entry((class.clone(), t)).or_insert(0) += 1;
            }
            return PinResult::Pinned;
        }
        // Beyond the occupied c-steps everything is free, so both searches
        // terminate.
        let mut pre_hint = cstep - 1;
        while self.is_busy(&class, pre_hint, ii, limit) {
            pre_hint -= 1;
        }
        let mut post_hint = cstep + 1;
        while self.is_busy(&class, post_hint, ii, limit) {
            post_hint += 1;
        }
        PinResult::Blocked {
            pre_hint,
            post_hint,
        }
    }

    fn clear_schedule(&mut self) {
        self.csteps.fill(None);
        self.occupancy.clear();
    }
}
