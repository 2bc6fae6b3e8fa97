use crate::{Instr, InstrDep, InstrIdx, SlotIdx};
use hls_utils::{Error, HlsResult, IndexRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A behavioral process lowered to three-address form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Bit width of every value slot.
    pub slots: Vec<u32>,
    pub instrs: Vec<Instr>,
}

impl Function {
    pub fn new<S: Into<String>>(
        name: S,
        slots: Vec<u32>,
        instrs: Vec<Instr>,
    ) -> HlsResult<Self> {
        let mut func = Self {
            name: name.into(),
            slots,
            instrs,
        };
        func.finalize()?;
        Ok(func)
    }

    /// Numbers the instructions by position and checks well-formedness.
    /// Must be called on functions obtained through deserialization.
    pub fn finalize(&mut self) -> HlsResult<()> {
        for (i, instr) in self.instrs.iter_mut().enumerate() {
            instr.index = InstrIdx::new(i);
        }
        self.validate()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instr(&self, idx: InstrIdx) -> &Instr {
        &self.instrs[idx.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instr> {
        self.instrs.iter()
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_width(&self, slot: SlotIdx) -> u32 {
        self.slots[slot.index()]
    }

    /// Maps every slot to the instruction writing it.
    pub fn producers(&self) -> HashMap<SlotIdx, InstrIdx> {
        self.instrs
            .iter()
            .flat_map(|i| i.results.iter().map(move |r| (*r, i.index)))
            .collect()
    }

    pub fn validate(&self) -> HlsResult<()> {
        if self.instrs.is_empty() {
            return Err(Error::malformed(format!(
                "function `{}' has no instructions",
                self.name
            )));
        }
        let n = self.instrs.len();
        let mut producer: Vec<Option<InstrIdx>> = vec![None; self.slots.len()];
        for instr in &self.instrs {
            let (ops, res) = instr.opcode.arity();
            if instr.operands.len() != ops || instr.results.len() != res {
                return Err(Error::malformed(format!(
                    "instruction {}: `{}' expects {ops} operand(s) and {res} result(s)",
                    instr.index, instr.opcode
                )));
            }
            for slot in instr.operands.iter().chain(instr.results.iter()) {
                if slot.index() >= self.slots.len() {
                    return Err(Error::malformed(format!(
                        "instruction {}: slot {slot} out of range",
                        instr.index
                    )));
                }
            }
            for r in &instr.results {
                if let Some(other) = producer[r.index()].replace(instr.index) {
                    return Err(Error::malformed(format!(
                        "slot {r} written by instructions {other} and {}",
                        instr.index
                    )));
                }
            }
            if let Some(t) = instr.opcode.branch_target() {
                if t.index() >= n {
                    return Err(Error::malformed(format!(
                        "instruction {}: branch target {t} out of range",
                        instr.index
                    )));
                }
            }
            for dep in &instr.deps {
                let pred = dep.pred();
                if pred.index() >= n || pred == instr.index {
                    return Err(Error::malformed(format!(
                        "instruction {}: invalid dependency on {pred}",
                        instr.index
                    )));
                }
                if let InstrDep::Time {
                    min_delay,
                    max_delay,
                    ..
                } = dep
                {
                    if *min_delay < 0 || min_delay > max_delay {
                        return Err(Error::malformed(format!(
                            "instruction {}: invalid delay window [{min_delay}, {max_delay}]",
                            instr.index
                        )));
                    }
                }
            }
        }
        for instr in &self.instrs {
            if let Some(slot) =
                instr.operands.iter().find(|s| producer[s.index()].is_none())
            {
                return Err(Error::malformed(format!(
                    "instruction {}: operand slot {slot} is never written",
                    instr.index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    fn konst(v: i64, r: usize) -> Instr {
        Instr::new(Opcode::Const(v), &[], &[r])
    }

    #[test]
    fn finalize_numbers_instructions() {
        let func = Function::new(
            "f",
            vec![8; 3],
            vec![konst(1, 0), konst(2, 1), Instr::new(Opcode::Add, &[0, 1], &[2])],
        )
        .unwrap();
        assert_eq!(func.instrs[2].index, InstrIdx::new(2));
        assert_eq!(func.producers()[&SlotIdx::new(1)], InstrIdx::new(1));
    }

    #[test]
    fn rejects_malformed_functions() {
        let double_write =
            Function::new("f", vec![8], vec![konst(1, 0), konst(2, 0)]);
        assert!(matches!(double_write, Err(Error::Malformed(_))));

        let no_producer =
            Function::new("f", vec![8; 2], vec![Instr::new(Opcode::Neg, &[0], &[1])]);
        assert!(no_producer.is_err());

        let arity = Function::new("f", vec![8; 2], vec![Instr::new(Opcode::Add, &[], &[0])]);
        assert!(arity.is_err());

        let bad_window = Function::new(
            "f",
            vec![8; 2],
            vec![
                konst(1, 0),
                konst(1, 1).with_dep(InstrDep::Time {
                    pred: InstrIdx::new(0),
                    min_delay: 3,
                    max_delay: 2,
                }),
            ],
        );
        assert!(bad_window.is_err());

        let bad_target = Function::new(
            "f",
            vec![],
            vec![Instr::new(Opcode::Goto(InstrIdx::new(4)), &[], &[])],
        );
        assert!(bad_target.is_err());
        assert!(Function::new("f", vec![], vec![]).is_err());
    }
}
