use crate::Fsm;
use hls_ir::Function;
use hls_opt::{HlsOutcome, alloc::ClassStats};
use hls_utils::{HlsResult, IndexRef};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ScheduledInstr {
    pub index: usize,
    pub instr: String,
    pub cstep: i64,
    pub unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfilerReport {
    pub name: String,
    pub valid: bool,
    pub first_cstep: i64,
    pub last_cstep: i64,
    pub span: i64,
}

/// Machine-readable summary of a run.
#[derive(Debug, Serialize)]
pub struct HlsReport {
    pub name: String,
    pub cstep_count: usize,
    pub blocks: Vec<(i64, i64)>,
    pub schedule: Vec<ScheduledInstr>,
    pub units: Vec<ClassStats>,
    pub states: usize,
    /// Number of multiplexed targets by multiplexer width.
    pub muxes: BTreeMap<usize, usize>,
    pub live_values: BTreeMap<i64, usize>,
    pub profilers: Vec<ProfilerReport>,
}

impl HlsReport {
    pub fn new(func: &Function, outcome: &HlsOutcome<Fsm>) -> Self {
        Self {
            name: func.name.clone(),
            cstep_count: outcome.cstep_count,
            blocks: outcome.blocks.iter().map(|b| (b.start, b.end)).collect(),
            schedule: outcome
                .schedule
                .iter()
                .map(|(i, cstep)| ScheduledInstr {
                    index: i.index(),
                    instr: func.instr(*i).to_string(),
                    cstep: *cstep,
                    unit: outcome
                        .bindings
                        .get(i)
                        .map(|u| outcome.design.unit(*u).name.clone()),
                })
                .collect(),
            units: outcome.unit_stats.clone(),
            states: outcome.controller.len(),
            muxes: outcome.interconnect.mux_histogram(),
            live_values: outcome.live_values.clone(),
            profilers: outcome
                .profilers
                .iter()
                .map(|p| ProfilerReport {
                    name: p.name.clone(),
                    valid: p.is_valid(),
                    first_cstep: p.first_cstep(),
                    last_cstep: p.last_cstep(),
                    span: p.span(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> HlsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
