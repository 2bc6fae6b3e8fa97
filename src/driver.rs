//! Driver for the hlsc binary.
use crate::cmdline::{Opts, ReportKind};
use hls_backend::{
    DefaultDatapathBuilder, Fsm, FsmControlpathBuilder, HlsReport, MinRegInterconnectBuilder,
};
use hls_ir::Function;
use hls_opt::{HlsOutcome, HlsPlan, alloc::FuLibrary, schedule::SchedulingConstraints};
use hls_utils::HlsResult;
use itertools::Itertools;
use serde::Deserialize;
use std::{
    fmt::Write as _,
    io::{Read, Write},
    path::Path,
};

/// Contents of an input file.
#[derive(Debug, Deserialize)]
pub struct HlsInput {
    pub function: Function,
    #[serde(default)]
    pub constraints: SchedulingConstraints,
    #[serde(default)]
    pub library: FuLibrary,
}

impl HlsInput {
    pub fn parse(text: &str) -> HlsResult<Self> {
        let mut input: HlsInput = serde_json::from_str(text)?;
        input.function.finalize()?;
        Ok(input)
    }

    /// Reads the input from `path`, or from stdin when no path is given.
    pub fn load(path: Option<&Path>) -> HlsResult<Self> {
        let text = match path {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            }
        };
        Self::parse(&text)
    }
}

/// A completed run together with the builders that produced the hardware.
pub struct Synthesis {
    pub function: Function,
    pub outcome: HlsOutcome<Fsm>,
    pub datapath: DefaultDatapathBuilder,
    pub interconnect: MinRegInterconnectBuilder,
}

impl Synthesis {
    pub fn run(function: Function, plan: &HlsPlan) -> HlsResult<Self> {
        let mut datapath = DefaultDatapathBuilder::default();
        let mut interconnect = MinRegInterconnectBuilder::default();
        let mut controlpath = FsmControlpathBuilder::default();
        let outcome = plan.execute(
            &function,
            &mut datapath,
            &mut interconnect,
            &mut controlpath,
        )?;
        Ok(Self {
            function,
            outcome,
            datapath,
            interconnect,
        })
    }

    pub fn render(&self, report: ReportKind) -> HlsResult<String> {
        let outcome = &self.outcome;
        let signals = &outcome.design.signals;
        let mut out = String::new();
        // Writing to a `String` cannot fail.
        let _ = match report {
            ReportKind::Schedule => writeln!(
                out,
                "{}c-steps: {}",
                outcome.schedule_report, outcome.cstep_count
            ),
            ReportKind::Binding => {
                let stats = outcome.unit_stats.iter().join("");
                write!(
                    out,
                    "{}{stats}{}",
                    outcome.binding_report,
                    self.datapath.report(&outcome.design)
                )
            }
            ReportKind::Flows => write!(out, "{}", outcome.interconnect.report(signals)),
            ReportKind::Mux => write!(out, "{}", outcome.interconnect.mux_report(signals)),
            ReportKind::Fsm => write!(out, "{}", outcome.controller.report(&outcome.design)),
            ReportKind::Json => {
                let json = HlsReport::new(&self.function, outcome).to_json()?;
                writeln!(out, "{json}")
            }
        };
        Ok(out)
    }
}

/// Run hlsc from the command line.
pub fn run_hls() -> HlsResult<()> {
    let mut opts: Opts = argh::from_env();

    // enable tracing
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    let input = HlsInput::load(opts.file.as_deref())?;
    let plan = opts.plan(input.constraints, input.library);
    log::info!(
        "{}: {} scheduler, {} allocation",
        input.function.name,
        plan.scheduler,
        plan.policy
    );
    let synthesis = Synthesis::run(input.function, &plan)?;
    let text = synthesis.render(opts.report)?;
    let mut out = opts.output.get_write()?;
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}
