use hls_ir::{Function, InstrIdx};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measures the number of c-steps taken by the instructions whose source
/// offsets lie inside `[begin, end]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleProfiler {
    pub name: String,
    pub begin: u32,
    pub end: u32,
    #[serde(skip)]
    span: Option<(i64, i64)>,
}

impl ScheduleProfiler {
    pub fn new<S: ToString>(name: S, begin: u32, end: u32) -> Self {
        Self {
            name: name.to_string(),
            begin,
            end,
            span: None,
        }
    }

    /// Records the c-steps of the first and last matched instruction. The
    /// profiler becomes invalid when nothing matched or when the last match
    /// was scheduled before the first one.
    pub fn extract_from<F>(&mut self, func: &Function, cstep: F)
    where
        F: Fn(InstrIdx) -> Option<i64>,
    {
        let mut matched = func.iter().filter(|i| {
            i.source
                .is_some_and(|s| self.begin <= s && s <= self.end)
        });
        let first = matched.next();
        let last = matched.last().or(first);
        self.span = match (first, last) {
            (Some(f), Some(l)) => match (cstep(f.index), cstep(l.index)) {
                (Some(fc), Some(lc)) if lc >= fc => Some((fc, lc)),
                _ => None,
            },
            _ => None,
        };
        if self.span.is_none() {
            log::warn!("profiler `{}' is invalid", self.name);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.span.is_some()
    }

    pub fn first_cstep(&self) -> i64 {
        self.span.map_or(1, |(f, _)| f)
    }

    pub fn last_cstep(&self) -> i64 {
        self.span.map_or(0, |(_, l)| l)
    }

    /// Zero for an invalid profiler.
    pub fn span(&self) -> i64 {
        self.last_cstep() - self.first_cstep() + 1
    }
}

impl fmt::Display for ScheduleProfiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: from {} to {}, valid: {}, first c-step: {}, last c-step: {}, span: {}",
            self.name,
            self.begin,
            self.end,
            self.is_valid(),
            self.first_cstep(),
            self.last_cstep(),
            self.span()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hls_ir::{Instr, Opcode};
    use hls_utils::IndexRef;

    fn sourced() -> Function {
        Function::new(
            "f",
            vec![8; 3],
            vec![
                Instr::new(Opcode::Const(1), &[], &[0]).with_source(10),
                Instr::new(Opcode::Const(2), &[], &[1]).with_source(12),
                Instr::new(Opcode::Add, &[0, 1], &[2]).with_source(20),
            ],
        )
        .unwrap()
    }

    #[test]
    fn span_of_matched_instructions() {
        let func = sourced();
        let csteps = [0, 1, 4];
        let mut p = ScheduleProfiler::new("body", 10, 20);
        p.extract_from(&func, |i| Some(csteps[i.index()]));
        assert!(p.is_valid());
        assert_eq!((p.first_cstep(), p.last_cstep(), p.span()), (0, 4, 5));
        assert_eq!(
            p.to_string(),
            "body: from 10 to 20, valid: true, first c-step: 0, last c-step: 4, span: 5"
        );
    }

    #[test]
    fn unmatched_profiler_is_invalid() {
        let func = sourced();
        let mut p = ScheduleProfiler::new("none", 30, 40);
        p.extract_from(&func, |_| Some(0));
        assert!(!p.is_valid());
        assert_eq!(p.span(), 0);
    }

    #[test]
    fn reversed_order_is_invalid() {
        let func = sourced();
        let csteps = [3, 1, 0];
        let mut p = ScheduleProfiler::new("rev", 10, 20);
        p.extract_from(&func, |i| Some(csteps[i.index()]));
        assert!(!p.is_valid());
    }
}
