//! Command line parsing for hlsc.
use argh::FromArgs;
use hls_ir::FuClass;
use hls_opt::{HlsPlan, PolicyKind, SchedulerKind, alloc::FuLibrary, schedule::SchedulingConstraints};
use hls_utils::OutputFile;
use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

/// Report written after a successful run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportKind {
    /// Instructions grouped by c-step.
    #[default]
    Schedule,
    /// Unit chosen for every instruction and unit utilization.
    Binding,
    /// Flow matrix after interconnect synthesis.
    Flows,
    Mux,
    Fsm,
    Json,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Schedule,
        ReportKind::Binding,
        ReportKind::Flows,
        ReportKind::Mux,
        ReportKind::Fsm,
        ReportKind::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Schedule => "schedule",
            ReportKind::Binding => "binding",
            ReportKind::Flows => "flows",
            ReportKind::Mux => "mux",
            ReportKind::Fsm => "fsm",
            ReportKind::Json => "json",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| {
                format!(
                    "unknown report `{s}', expected one of: {}",
                    ReportKind::ALL.map(|r| r.name()).join(", ")
                )
            })
    }
}

/// Upper bound on the number of units of one class, written `class=n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuLimit {
    pub class: FuClass,
    pub count: usize,
}

impl FromStr for FuLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((class, count)) = s.split_once('=') else {
            return Err(format!("expected `class=count', found `{s}'"));
        };
        let count = count
            .trim()
            .parse()
            .map_err(|e| format!("invalid unit count in `{s}': {e}"))?;
        Ok(FuLimit {
            class: class.trim().parse()?,
            count,
        })
    }
}

#[derive(FromArgs, Debug)]
#[argh(help_triggers("-h", "--help"))]
/// Schedules a three-address function and allocates hardware for it
pub struct Opts {
    /// input JSON file, stdin when omitted
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// output file, default is stdout
    #[argh(
        option,
        short = 'o',
        long = "output",
        default = "OutputFile::Stdout"
    )]
    pub output: OutputFile,

    /// scheduling algorithm: asap, alap, list, force-directed, sequential or
    /// one-per-cstep. default = list
    #[argh(option, long = "scheduler", default = "SchedulerKind::List")]
    pub scheduler: SchedulerKind,

    /// allocation policy: default or context-sensitive. default =
    /// context-sensitive
    #[argh(option, long = "policy", default = "PolicyKind::ContextSensitive")]
    pub policy: PolicyKind,

    /// slack multiplier on the critical path, overrides the input file
    #[argh(option, long = "sched-scale")]
    pub sched_scale: Option<f64>,

    /// exclusive upper bound on the c-steps, overrides the input file
    #[argh(option, long = "max-csteps")]
    pub max_csteps: Option<i64>,

    /// prefer fewer functional units over a shorter schedule
    #[argh(switch, long = "minimize-fus")]
    pub minimize_fus: bool,

    /// sharing cost above which a new unit is allocated. default = 2.0
    #[argh(option, long = "max-cost", default = "2.0")]
    pub max_cost: f64,

    /// limit the units of a class, e.g. `adder=2`. may be repeated
    #[argh(option, long = "fu-limit")]
    pub fu_limit: Vec<FuLimit>,

    /// report to write: schedule, binding, flows, mux, fsm or json. default =
    /// schedule
    #[argh(option, short = 'r', long = "report", default = "ReportKind::Schedule")]
    pub report: ReportKind,

    /// logging level
    #[argh(option, long = "log", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,
}

impl Opts {
    /// Builds the run configuration. Flags take precedence over the
    /// constraints read from the input.
    pub fn plan(
        &self,
        mut constraints: SchedulingConstraints,
        library: FuLibrary,
    ) -> HlsPlan {
        if let Some(scale) = self.sched_scale {
            constraints.sched_scale = scale;
        }
        if let Some(end) = self.max_csteps {
            constraints.end_time = Some(constraints.start_time + end);
        }
        constraints.minimize_fus |= self.minimize_fus;
        let fu_limits: HashMap<FuClass, usize> = self
            .fu_limit
            .iter()
            .map(|l| (l.class, l.count))
            .collect();
        HlsPlan {
            scheduler: self.scheduler,
            policy: self.policy,
            constraints,
            max_cost: self.max_cost,
            fu_limits,
            library,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opts {
        Opts::from_args(&["hlsc"], args).unwrap()
    }

    #[test]
    fn defaults() {
        let opts = parse(&[]);
        assert!(opts.file.is_none());
        assert!(matches!(opts.output, OutputFile::Stdout));
        assert_eq!(opts.scheduler, SchedulerKind::List);
        assert_eq!(opts.policy, PolicyKind::ContextSensitive);
        assert_eq!(opts.report, ReportKind::Schedule);
        assert_eq!(opts.log_level, log::LevelFilter::Warn);
        assert_eq!(opts.max_cost, 2.0);
    }

    #[test]
    fn flags_override_input_constraints() {
        let opts = parse(&[
            "in.json",
            "--scheduler",
            "force-directed",
            "--sched-scale",
            "1.5",
            "--max-csteps",
            "12",
            "--fu-limit",
            "adder=1",
            "--fu-limit",
            "multiplier = 2",
            "-r",
            "json",
        ]);
        assert_eq!(opts.file, Some(PathBuf::from("in.json")));
        assert_eq!(opts.report, ReportKind::Json);
        let constraints = SchedulingConstraints {
            start_time: 3,
            minimize_fus: true,
            ..Default::default()
        };
        let plan = opts.plan(constraints, FuLibrary::default());
        assert_eq!(plan.scheduler, SchedulerKind::ForceDirected);
        assert_eq!(plan.constraints.sched_scale, 1.5);
        assert_eq!(plan.constraints.end_time, Some(15));
        assert!(plan.constraints.minimize_fus);
        assert_eq!(plan.fu_limits[&FuClass::Adder], 1);
        assert_eq!(plan.fu_limits[&FuClass::Multiplier], 2);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!("adder".parse::<FuLimit>().is_err());
        assert!("adder=many".parse::<FuLimit>().is_err());
        assert!("flux=1".parse::<FuLimit>().is_err());
        assert!("verilog".parse::<ReportKind>().is_err());
        assert!(Opts::from_args(&["hlsc"], &["--scheduler", "random"]).is_err());
    }
}
