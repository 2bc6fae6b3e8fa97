use crate::{Flow, FlowKind, ParFlow, SignalIdx, SignalTable};
use hls_utils::{Error, HlsResult};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Write,
};

/// Data flows of a design, organized by c-step.
///
/// Every c-step owns one [ParFlow]. The neutral flows describe what each
/// signal is driven with when no c-step says otherwise.
#[derive(Clone, Debug, Default)]
pub struct FlowMatrix {
    steps: Vec<ParFlow>,
    neutral: ParFlow,
    comments: Vec<Vec<String>>,
}

impl FlowMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of c-steps holding flows or comments.
    pub fn num_csteps(&self) -> usize {
        self.steps.len()
    }

    fn ensure(&mut self, cstep: usize) {
        if self.steps.len() <= cstep {
            self.steps.resize_with(cstep + 1, ParFlow::new);
            self.comments.resize_with(cstep + 1, Vec::new);
        }
    }

    /// Makes sure the matrix spans at least `count` c-steps.
    pub fn reserve_csteps(&mut self, count: usize) {
        if count > 0 {
            self.ensure(count - 1);
        }
    }

    /// Adds a flow in `cstep`. Adding a flow identical to an existing one is a
    /// no-op; driving a target differently twice is an error.
    pub fn add(&mut self, cstep: usize, flow: Flow) -> HlsResult<()> {
        self.ensure(cstep);
        let step = &mut self.steps[cstep];
        match step.lookup_target(flow.target) {
            Some(existing) if *existing != flow => Err(Error::DriverConflict {
                target: format!("signal {}", flow.target),
                cstep,
            }),
            _ => {
                step.add(flow);
                Ok(())
            }
        }
    }

    pub fn add_par(&mut self, cstep: usize, pflow: &ParFlow) -> HlsResult<()> {
        for flow in pflow.flows() {
            self.add(cstep, *flow)?;
        }
        Ok(())
    }

    /// Adds the `i`-th element of `seq` to c-step `cstep + i`.
    pub fn add_seq(&mut self, cstep: usize, seq: &[ParFlow]) -> HlsResult<()> {
        for (i, pflow) in seq.iter().enumerate() {
            self.add_par(cstep + i, pflow)?;
        }
        Ok(())
    }

    pub fn add_neutral(&mut self, pflow: &ParFlow) {
        self.neutral.integrate(pflow);
    }

    pub fn neutral(&self) -> &ParFlow {
        &self.neutral
    }

    pub fn append_comment<S: Into<String>>(&mut self, cstep: usize, comment: S) {
        self.ensure(cstep);
        self.comments[cstep].push(comment.into());
    }

    pub fn comments(&self, cstep: usize) -> &[String] {
        self.comments.get(cstep).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn flows(&self, cstep: usize) -> Option<&ParFlow> {
        self.steps.get(cstep)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ParFlow)> {
        self.steps.iter().enumerate()
    }

    /// All flows of all c-steps followed by the neutral flows.
    fn all_flows(&self) -> impl Iterator<Item = &Flow> {
        self.steps
            .iter()
            .flat_map(|p| p.flows())
            .chain(self.neutral.flows())
    }

    pub fn flow_targets(&self) -> BTreeSet<SignalIdx> {
        self.all_flows().map(|f| f.target).collect()
    }

    pub fn flow_sources(&self) -> BTreeSet<SignalIdx> {
        self.all_flows().filter_map(Flow::source).collect()
    }

    /// Distinct ways `target` is driven across all c-steps, in order of first
    /// appearance. Don't-care values are left out.
    pub fn flows_to(&self, target: SignalIdx) -> Vec<FlowKind> {
        self.steps
            .iter()
            .filter_map(|p| p.lookup_target(target))
            .chain(self.neutral.lookup_target(target))
            .filter(|f| !f.is_dont_care())
            .map(|f| f.kind)
            .unique()
            .collect()
    }

    /// Short-circuits chains inside each c-step: when `b <= a` and `c <= b`
    /// happen in the same c-step, the latter becomes `c <= a`.
    pub fn transitize(&mut self) -> HlsResult<()> {
        for step in &mut self.steps {
            let snapshot = step.clone();
            for flow in snapshot.flows() {
                let FlowKind::Signal(mut source) = flow.kind else {
                    continue;
                };
                let mut seen = HashSet::from([flow.target]);
                let mut kind = flow.kind;
                while let Some(upstream) = snapshot.lookup_target(source) {
                    if !seen.insert(source) {
                        return Err(Error::CyclicDataflow(format!(
                            "signal {source}"
                        )));
                    }
                    kind = upstream.kind;
                    match upstream.kind {
                        FlowKind::Signal(next) => source = next,
                        _ => break,
                    }
                }
                if kind != flow.kind {
                    step.add(Flow {
                        target: flow.target,
                        kind,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every flow tagged with the c-step it happens in.
    pub fn timed_flows(&self) -> Vec<Flow> {
        self.iter()
            .flat_map(|(cstep, pflow)| {
                let time = cstep as i64;
                pflow.flows().filter(|f| !f.is_dont_care()).map(move |f| {
                    let kind = match f.kind {
                        FlowKind::Value(value) => FlowKind::TimedValue { value, time },
                        FlowKind::Signal(source) => {
                            FlowKind::TimestampedSignal { source, time }
                        }
                        FlowKind::DelayedSignal { source, delay } => {
                            FlowKind::TimedSignal {
                                source,
                                time,
                                delay,
                            }
                        }
                        timed => timed,
                    };
                    Flow {
                        target: f.target,
                        kind,
                    }
                })
            })
            .collect()
    }

    /// Maps a multiplexer width to the number of targets with that many
    /// distinct drivers.
    pub fn mux_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for target in self.flow_targets() {
            let width = self.flows_to(target).len();
            if width > 0 {
                *histogram.entry(width).or_insert(0) += 1;
            }
        }
        histogram
    }

    pub fn mux_report(&self, signals: &SignalTable) -> String {
        let mut out = String::new();
        let mut total = 0;
        for target in self.flow_targets() {
            let drivers = self.flows_to(target);
            if drivers.len() < 2 {
                continue;
            }
            total += drivers.len();
            let shown = drivers.iter().map(|kind| kind.display(signals)).join(", ");
            let _ = writeln!(
                out,
                "{}: {} inputs: {shown}",
                signals.name(target),
                drivers.len()
            );
        }
        let _ = writeln!(out, "total multiplexer inputs: {total}");
        for (width, count) in self.mux_histogram() {
            let _ = writeln!(out, "  {width}-input: {count}");
        }
        out
    }

    /// Human-readable listing of all c-steps.
    pub fn report(&self, signals: &SignalTable) -> String {
        let mut out = String::new();
        for (cstep, pflow) in self.iter() {
            let _ = writeln!(out, "c-step {cstep}:");
            for comment in self.comments(cstep) {
                let _ = writeln!(out, "  # {comment}");
            }
            for flow in pflow.flows() {
                let _ = writeln!(out, "  {}", flow.display(signals));
            }
        }
        if !self.neutral.is_empty() {
            let _ = writeln!(out, "neutral:");
            for flow in self.neutral.flows() {
                let _ = writeln!(out, "  {}", flow.display(signals));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SignalKind, SlotIdx, Value};
    use hls_utils::IndexRef;

    fn signals(n: usize) -> (SignalTable, Vec<SignalIdx>) {
        let mut table = SignalTable::default();
        let idx = (0..n)
            .map(|i| {
                table.add(
                    format!("s{i}"),
                    8,
                    SignalKind::Temporary(SlotIdx::new(i)),
                )
            })
            .collect();
        (table, idx)
    }

    #[test]
    fn conflicting_drivers_are_rejected() {
        let (_, s) = signals(3);
        let mut fm = FlowMatrix::new();
        fm.add(2, Flow::signal(s[0], s[1])).unwrap();
        fm.add(2, Flow::signal(s[0], s[1])).unwrap();
        assert!(matches!(
            fm.add(2, Flow::signal(s[0], s[2])),
            Err(Error::DriverConflict { cstep: 2, .. })
        ));
        fm.add(3, Flow::signal(s[0], s[2])).unwrap();
        assert_eq!(fm.num_csteps(), 4);
        assert_eq!(
            fm.flows_to(s[0]),
            vec![FlowKind::Signal(s[1]), FlowKind::Signal(s[2])]
        );
    }

    #[test]
    fn sequences_span_consecutive_csteps() {
        let (table, s) = signals(3);
        let mut fm = FlowMatrix::new();
        fm.add_seq(
            1,
            &[
                ParFlow::from_flows([Flow::signal(s[0], s[1])]),
                ParFlow::new(),
                ParFlow::from_flows([Flow::value(s[2], Value::Int(7))]),
            ],
        )
        .unwrap();
        fm.append_comment(1, "0: mul (1, 2) => (3)");
        fm.add_neutral(&ParFlow::from_flows([Flow::value(s[0], Value::DontCare)]));
        assert_eq!(fm.num_csteps(), 4);
        assert!(fm.flows(0).unwrap().is_empty());
        assert_eq!(fm.comments(1).len(), 1);
        assert!(fm.comments(9).is_empty());
        let report = fm.report(&table);
        assert!(report.contains("c-step 3:\n  s2 <= 7"));
        assert!(report.contains("neutral:\n  s0 <= -"));
        let timed = fm.timed_flows();
        assert_eq!(timed.len(), 2);
        assert_eq!(timed[1].time(), Some(3));
    }

    #[test]
    fn transitize_folds_chains() {
        let (_, s) = signals(4);
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::value(s[0], Value::Int(5))).unwrap();
        fm.add(0, Flow::signal(s[1], s[0])).unwrap();
        fm.add(0, Flow::signal(s[2], s[1])).unwrap();
        fm.add(1, Flow::signal(s[3], s[1])).unwrap();
        fm.transitize().unwrap();
        let step = fm.flows(0).unwrap();
        assert_eq!(
            step.lookup_target(s[2]).map(|f| f.kind),
            Some(FlowKind::Value(Value::Int(5)))
        );
        assert_eq!(
            fm.flows(1).unwrap().lookup_target(s[3]).map(|f| f.kind),
            Some(FlowKind::Signal(s[1]))
        );
    }

    #[test]
    fn transitize_detects_cycles() {
        let (_, s) = signals(2);
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::signal(s[0], s[1])).unwrap();
        fm.add(0, Flow::signal(s[1], s[0])).unwrap();
        assert!(matches!(fm.transitize(), Err(Error::CyclicDataflow(_))));
    }

    #[test]
    fn mux_statistics() {
        let (table, s) = signals(4);
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::signal(s[0], s[1])).unwrap();
        fm.add(1, Flow::signal(s[0], s[2])).unwrap();
        fm.add(2, Flow::signal(s[0], s[3])).unwrap();
        fm.add(2, Flow::signal(s[1], s[3])).unwrap();
        fm.add_neutral(&ParFlow::from_flows([Flow::value(s[1], Value::DontCare)]));
        let histogram = fm.mux_histogram();
        assert_eq!(histogram.get(&3), Some(&1));
        assert_eq!(histogram.get(&1), Some(&1));
        let report = fm.mux_report(&table);
        assert!(report.starts_with("s0: 3 inputs: s1, s2, s3"));
        assert!(report.contains("total multiplexer inputs: 3"));
    }
}
