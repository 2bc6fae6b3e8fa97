use crate::{Expr, Process, SignalIdx, SignalTable, Stmt, Value};
use hls_utils::{Error, HlsResult};
use linked_hash_map::LinkedHashMap;
use std::fmt;

/// What drives the target of a [Flow].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Value(Value),
    Signal(SignalIdx),
    /// The source as it was `delay` c-steps earlier.
    DelayedSignal { source: SignalIdx, delay: i64 },
    TimestampedSignal { source: SignalIdx, time: i64 },
    TimedSignal {
        source: SignalIdx,
        time: i64,
        delay: i64,
    },
    TimedValue { value: Value, time: i64 },
}

/// One data transfer into `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Flow {
    pub target: SignalIdx,
    pub kind: FlowKind,
}

impl Flow {
    pub fn value(target: SignalIdx, value: Value) -> Self {
        Self {
            target,
            kind: FlowKind::Value(value),
        }
    }

    pub fn signal(target: SignalIdx, source: SignalIdx) -> Self {
        Self {
            target,
            kind: FlowKind::Signal(source),
        }
    }

    pub fn source(&self) -> Option<SignalIdx> {
        match self.kind {
            FlowKind::Signal(source)
            | FlowKind::DelayedSignal { source, .. }
            | FlowKind::TimestampedSignal { source, .. }
            | FlowKind::TimedSignal { source, .. } => Some(source),
            FlowKind::Value(_) | FlowKind::TimedValue { .. } => None,
        }
    }

    pub fn time(&self) -> Option<i64> {
        match self.kind {
            FlowKind::TimestampedSignal { time, .. }
            | FlowKind::TimedSignal { time, .. }
            | FlowKind::TimedValue { time, .. } => Some(time),
            _ => None,
        }
    }

    pub fn is_dont_care(&self) -> bool {
        matches!(
            self.kind,
            FlowKind::Value(Value::DontCare)
                | FlowKind::TimedValue {
                    value: Value::DontCare,
                    ..
                }
        )
    }

    /// The flow as a concurrent store. Only untimed flows have one.
    pub fn to_stmt(&self) -> HlsResult<Stmt> {
        let value = match self.kind {
            FlowKind::Value(v) => Expr::Const(v),
            FlowKind::Signal(s) => Expr::Signal(s),
            _ => {
                return Err(Error::unsupported(
                    "delayed and timed flows have no process realization",
                ));
            }
        };
        Ok(Stmt::Store {
            target: self.target,
            value,
        })
    }

    pub fn display<'a>(&'a self, signals: &'a SignalTable) -> FlowDisplay<'a> {
        FlowDisplay {
            flow: self,
            signals,
        }
    }
}

pub struct FlowDisplay<'a> {
    flow: &'a Flow,
    signals: &'a SignalTable,
}

impl fmt::Display for FlowDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <= {}",
            self.signals.name(self.flow.target),
            self.flow.kind.display(self.signals)
        )
    }
}

impl FlowKind {
    pub fn display<'a>(&'a self, signals: &'a SignalTable) -> FlowKindDisplay<'a> {
        FlowKindDisplay {
            kind: self,
            signals,
        }
    }
}

pub struct FlowKindDisplay<'a> {
    kind: &'a FlowKind,
    signals: &'a SignalTable,
}

impl fmt::Display for FlowKindDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s| self.signals.name(s);
        match *self.kind {
            FlowKind::Value(v) => write!(f, "{v}"),
            FlowKind::Signal(s) => write!(f, "{}", name(s)),
            FlowKind::DelayedSignal { source, delay } => {
                write!(f, "{} @+{delay}", name(source))
            }
            FlowKind::TimestampedSignal { source, time } => {
                write!(f, "{} @{time}", name(source))
            }
            FlowKind::TimedSignal {
                source,
                time,
                delay,
            } => write!(f, "{} @{time}+{delay}", name(source)),
            FlowKind::TimedValue { value, time } => write!(f, "{value} @{time}"),
        }
    }
}

/// Flows that happen concurrently, at most one per target. Adding a flow to
/// an already driven target replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct ParFlow {
    flows: LinkedHashMap<SignalIdx, Flow>,
}

impl ParFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_flows<I: IntoIterator<Item = Flow>>(flows: I) -> Self {
        let mut pflow = Self::new();
        for flow in flows {
            pflow.add(flow);
        }
        pflow
    }

    /// Extracts the flows of a process made of plain concurrent stores.
    /// Stores of constants and signals are accepted; comments and no-ops are
    /// skipped. Anything else makes the process not extractable.
    pub fn extract(process: &Process) -> HlsResult<Self> {
        let mut pflow = Self::new();
        for stmt in &process.stmts {
            match stmt {
                Stmt::Store {
                    target,
                    value: Expr::Const(v),
                } => pflow.add(Flow::value(*target, *v)),
                Stmt::Store {
                    target,
                    value: Expr::Signal(s),
                } => pflow.add(Flow::signal(*target, *s)),
                Stmt::Store { .. } => {
                    return Err(Error::not_extractable(
                        "store of a compound expression",
                    ));
                }
                Stmt::If { .. } => {
                    return Err(Error::not_extractable("conditional statement"));
                }
                Stmt::Loop(_) => return Err(Error::not_extractable("loop")),
                Stmt::Call { callee, .. } => {
                    return Err(Error::not_extractable(format!(
                        "call of `{callee}'"
                    )));
                }
                Stmt::Comment(_) | Stmt::Nop => {}
            }
        }
        Ok(pflow)
    }

    pub fn add(&mut self, flow: Flow) {
        self.flows.insert(flow.target, flow);
    }

    pub fn contains_target(&self, target: SignalIdx) -> bool {
        self.flows.contains_key(&target)
    }

    pub fn lookup_target(&self, target: SignalIdx) -> Option<&Flow> {
        self.flows.get(&target)
    }

    pub fn remove(&mut self, target: SignalIdx) -> Option<Flow> {
        self.flows.remove(&target)
    }

    /// Adds all flows of `other`, which take precedence on shared targets.
    pub fn integrate(&mut self, other: &ParFlow) {
        for flow in other.flows() {
            self.add(*flow);
        }
    }

    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = SignalIdx> + '_ {
        self.flows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Realizes the flows as a process of concurrent stores.
    pub fn to_process(&self) -> HlsResult<Process> {
        Ok(Process {
            stmts: self
                .flows()
                .map(Flow::to_stmt)
                .collect::<HlsResult<_>>()?,
        })
    }
}

impl PartialEq for ParFlow {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .flows()
                .all(|f| other.lookup_target(f.target) == Some(f))
    }
}

impl Eq for ParFlow {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OpKind, SignalKind, SlotIdx};
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
    fn last_write_wins() {
        let (_, s) = signals(3);
        let pflow = ParFlow::from_flows([
            Flow::signal(s[0], s[1]),
            Flow::value(s[0], Value::Int(4)),
            Flow::signal(s[2], s[1]),
        ]);
        assert_eq!(pflow.len(), 2);
        assert_eq!(
            pflow.lookup_target(s[0]).map(|f| f.kind),
            Some(FlowKind::Value(Value::Int(4)))
        );
        assert!(pflow.contains_target(s[2]));
        assert!(!pflow.contains_target(s[1]));
    }

    #[test]
    fn integrate_overrides() {
        let (_, s) = signals(3);
        let mut base = ParFlow::from_flows([
            Flow::value(s[0], Value::DontCare),
            Flow::value(s[1], Value::DontCare),
        ]);
        base.integrate(&ParFlow::from_flows([Flow::signal(s[1], s[2])]));
        assert_eq!(
            base,
            ParFlow::from_flows([
                Flow::signal(s[1], s[2]),
                Flow::value(s[0], Value::DontCare),
            ])
        );
    }

    #[test]
    fn extraction_round_trips_through_process() {
        let (table, s) = signals(3);
        let mut process = Process::new();
        process
            .store(s[0], Expr::Signal(s[1]))
            .push(Stmt::Comment("load".into()))
            .store(s[2], Expr::Const(Value::Int(1)));
        let pflow = ParFlow::extract(&process).unwrap();
        assert_eq!(pflow.len(), 2);
        assert_eq!(ParFlow::extract(&pflow.to_process().unwrap()).unwrap(), pflow);
        let shown: Vec<String> =
            pflow.flows().map(|f| f.display(&table).to_string()).collect();
        assert_eq!(shown, vec!["s0 <= s1", "s2 <= 1"]);
    }

    #[test]
    fn procedural_statements_are_not_extractable() {
        let (_, s) = signals(2);
        let branchy = Process {
            stmts: vec![Stmt::If {
                cond: Expr::Signal(s[0]),
                then: vec![Stmt::Store {
                    target: s[1],
                    value: Expr::Const(Value::Int(0)),
                }],
                otherwise: vec![],
            }],
        };
        assert!(matches!(
            ParFlow::extract(&branchy),
            Err(Error::NotExtractable(_))
        ));
        let compound = Process {
            stmts: vec![Stmt::Store {
                target: s[1],
                value: Expr::Op {
                    op: OpKind::Add,
                    args: vec![Expr::Signal(s[0]), Expr::Signal(s[0])],
                },
            }],
        };
        assert!(ParFlow::extract(&compound).is_err());
        let call = Process {
            stmts: vec![Stmt::Call {
                callee: "f".into(),
                args: vec![],
            }],
        };
        assert!(ParFlow::extract(&call).is_err());
        assert!(ParFlow::extract(&Process { stmts: vec![Stmt::Loop(vec![])] }).is_err());
    }

    #[test]
    fn timed_flows_have_no_process() {
        let (table, s) = signals(2);
        let flow = Flow {
            target: s[0],
            kind: FlowKind::TimedSignal {
                source: s[1],
                time: 3,
                delay: 1,
            },
        };
        assert_eq!(flow.source(), Some(s[1]));
        assert_eq!(flow.time(), Some(3));
        assert!(ParFlow::from_flows([flow]).to_process().is_err());
        assert_eq!(flow.display(&table).to_string(), "s0 <= s1 @3+1");
    }
}
