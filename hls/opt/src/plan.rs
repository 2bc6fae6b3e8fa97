use crate::{
    ControlpathBuilder, DatapathBuilder, InterconnectBuilder, Transition, XilSchedulingAdapter,
    alloc::{
        AllocationPolicy, Allocator, ClassStats, ContextSensitiveAllocation,
        DefaultAllocationPolicy, FuLibrary, MapperRegistry,
    },
    analysis::live_values,
    schedule::{
        AlapScheduler, AsapScheduler, BlockLayout, BlockSpan, ForceDirectedScheduler,
        FunctionScheduler, ListScheduler, MobilityPriority, OneInstructionPerCStepScheduler,
        ScheduleProfiler, SchedulingAdapter, SchedulingConstraints, SequentialScheduler,
        check_schedule,
    },
};
use hls_ir::{Design, FlowMatrix, FuClass, Function, InstrIdx, UnitIdx};
use hls_utils::HlsResult;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

/// Block-level scheduling algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerKind {
    Asap,
    Alap,
    #[default]
    List,
    ForceDirected,
    Sequential,
    OnePerCStep,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 6] = [
        SchedulerKind::Asap,
        SchedulerKind::Alap,
        SchedulerKind::List,
        SchedulerKind::ForceDirected,
        SchedulerKind::Sequential,
        SchedulerKind::OnePerCStep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchedulerKind::Asap => "asap",
            SchedulerKind::Alap => "alap",
            SchedulerKind::List => "list",
            SchedulerKind::ForceDirected => "force-directed",
            SchedulerKind::Sequential => "sequential",
            SchedulerKind::OnePerCStep => "one-per-cstep",
        }
    }

    /// Schedules a whole control-flow graph with this algorithm.
    pub fn schedule<A: SchedulingAdapter>(
        &self,
        blocks: &[BlockLayout<A::Task>],
        order: &[usize],
        adapter: &mut A,
        constraints: &mut SchedulingConstraints,
    ) -> HlsResult<Vec<BlockSpan>> {
        match self {
            SchedulerKind::Asap => FunctionScheduler::new(AsapScheduler::constrained())
                .schedule(blocks, order, adapter, constraints),
            SchedulerKind::Alap => FunctionScheduler::new(AlapScheduler::constrained())
                .schedule(blocks, order, adapter, constraints),
            SchedulerKind::List => {
                FunctionScheduler::new(ListScheduler::new(MobilityPriority))
                    .schedule(blocks, order, adapter, constraints)
            }
            SchedulerKind::ForceDirected => FunctionScheduler::new(ForceDirectedScheduler)
                .schedule(blocks, order, adapter, constraints),
            SchedulerKind::Sequential => FunctionScheduler::new(SequentialScheduler)
                .schedule(blocks, order, adapter, constraints),
            SchedulerKind::OnePerCStep => {
                FunctionScheduler::new(OneInstructionPerCStepScheduler)
                    .schedule(blocks, order, adapter, constraints)
            }
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchedulerKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                format!(
                    "unknown scheduler `{s}', expected one of: {}",
                    SchedulerKind::ALL.map(|k| k.name()).join(", ")
                )
            })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyKind {
    Default,
    #[default]
    ContextSensitive,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Default => write!(f, "default"),
            PolicyKind::ContextSensitive => write!(f, "context-sensitive"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PolicyKind::Default),
            "context-sensitive" => Ok(PolicyKind::ContextSensitive),
            _ => Err(format!(
                "unknown allocation policy `{s}', expected `default' or `context-sensitive'"
            )),
        }
    }
}

/// Everything produced by [HlsPlan::execute].
pub struct HlsOutcome<C> {
    pub design: Design,
    pub schedule: BTreeMap<InstrIdx, i64>,
    /// Unit executing each instruction.
    pub bindings: BTreeMap<InstrIdx, UnitIdx>,
    pub cstep_count: usize,
    pub blocks: Vec<BlockSpan>,
    pub unit_stats: Vec<ClassStats>,
    pub schedule_report: String,
    pub binding_report: String,
    /// Flows as produced by allocation, still routed through temporaries.
    pub flows: FlowMatrix,
    /// Flows after interconnect synthesis.
    pub interconnect: FlowMatrix,
    pub transitions: Vec<Transition>,
    pub controller: C,
    pub profilers: Vec<ScheduleProfiler>,
    /// Values alive in every c-step.
    pub live_values: BTreeMap<i64, usize>,
}

/// Configuration of a complete scheduling and allocation run.
#[derive(Clone, Debug)]
pub struct HlsPlan {
    pub scheduler: SchedulerKind,
    pub policy: PolicyKind,
    pub constraints: SchedulingConstraints,
    /// Sharing cost above which the context-sensitive policy allocates a new
    /// unit.
    pub max_cost: f64,
    pub fu_limits: HashMap<FuClass, usize>,
    pub library: FuLibrary,
}

impl Default for HlsPlan {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            policy: PolicyKind::default(),
            constraints: SchedulingConstraints::default(),
            max_cost: 2.0,
            fu_limits: HashMap::new(),
            library: FuLibrary::default(),
        }
    }
}

impl HlsPlan {
    fn policy(&self) -> Box<dyn AllocationPolicy> {
        match self.policy {
            PolicyKind::Default => Box::new(DefaultAllocationPolicy),
            PolicyKind::ContextSensitive => Box::new(ContextSensitiveAllocation::new(
                self.max_cost,
                self.fu_limits.clone(),
            )),
        }
    }

    /// Schedules `func`, binds its instructions to units and hands the result
    /// to the builders.
    pub fn execute<D, I, C>(
        &self,
        func: &Function,
        datapath: &mut D,
        interconnect: &mut I,
        controlpath: &mut C,
    ) -> HlsResult<HlsOutcome<C::Output>>
    where
        D: DatapathBuilder,
        I: InterconnectBuilder,
        C: ControlpathBuilder,
    {
        let registry = MapperRegistry::with_library(self.library.clone());
        let allocator = Allocator::new(registry, self.policy());
        let mut adapter = XilSchedulingAdapter::new(func, allocator)?;
        adapter.set_minimize_fus(self.constraints.minimize_fus);
        for (class, count) in &self.fu_limits {
            adapter.set_max_fu_allocation(*class, *count);
        }

        log::info!(
            "{}: scheduling {} instructions in {} blocks ({} scheduler)",
            func.name,
            func.len(),
            adapter.cfg().blocks().len(),
            self.scheduler
        );
        let blocks = adapter.block_layouts();
        let order = adapter.cfg().schedule_order().to_vec();
        let mut constraints = self.constraints.clone();
        let spans = self
            .scheduler
            .schedule(&blocks, &order, &mut adapter, &mut constraints)?;
        let tasks = adapter.tasks();
        check_schedule(&adapter, &tasks)?;
        let end = constraints.end_time.unwrap_or_default().max(0) as usize;
        let cstep_count = adapter.cstep_count().max(end);
        log::info!("{}: {cstep_count} c-steps", func.name);

        let mut profilers = self.constraints.profilers.clone();
        for profiler in &mut profilers {
            profiler.extract_from(func, |i| adapter.cstep(i));
            log::info!("{profiler}");
        }
        let live = live_values(&adapter, &tasks);

        controlpath.prepare_allocation(cstep_count);
        let mut design = Design::new();
        let flows = adapter.allocate(&mut design, datapath, cstep_count)?;
        let transitions = adapter.transitions(&design, &spans)?;
        log::info!(
            "{}: {} units, {} signals",
            func.name,
            design.units.len(),
            design.signals.len()
        );
        let wired = interconnect.create_interconnect(&mut design, datapath, &flows)?;
        let controller =
            controlpath.create_controlpath(&design, &wired, &transitions, &func.name)?;

        let unit_stats = adapter.allocator().unit_stats(&design, cstep_count as i64);
        for stats in &unit_stats {
            log::debug!("{}", stats.to_string().trim_end());
        }
        let schedule = tasks
            .iter()
            .filter_map(|t| adapter.cstep(*t).map(|c| (*t, c)))
            .collect();
        let bindings = adapter
            .allocator()
            .bindings()
            .map(|b| (b.instr, b.mapping.unit))
            .collect();
        Ok(HlsOutcome {
            schedule,
            bindings,
            cstep_count,
            blocks: spans,
            unit_stats,
            schedule_report: adapter.schedule_report(),
            binding_report: adapter.allocator().binding_report(&design, func),
            flows,
            interconnect: wired,
            transitions,
            controller,
            profilers,
            live_values: live,
            design,
        })
    }
}
