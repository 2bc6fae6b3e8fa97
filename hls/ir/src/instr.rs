use hls_utils::{IndexRef, impl_index};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Position of an instruction inside its [Function](crate::Function).
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Debug,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct InstrIdx(u32);
impl_index!(InstrIdx);

/// A value slot. Slots are single-assignment: equal slots denote the same
/// value.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotIdx(u32);
impl_index!(SlotIdx);

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }
}

/// Operations of the three-address form.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Cmp(CmpOp),
    /// `results[0] = operands[0] ? operands[1] : operands[2]`
    Select,
    Mov,
    Const(i64),
    /// Reads a process-local variable.
    LoadVar(String),
    StoreVar(String),
    ReadPort(String),
    WritePort(String),
    Goto(InstrIdx),
    BranchIfTrue(InstrIdx),
    BranchIfFalse(InstrIdx),
    Nop,
}

/// Field-less discriminant of [Opcode].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Cmp,
    Select,
    Mov,
    Const,
    LoadVar,
    StoreVar,
    ReadPort,
    WritePort,
    Goto,
    BranchIfTrue,
    BranchIfFalse,
    Nop,
}

impl Opcode {
    pub fn kind(&self) -> OpKind {
        match self {
            Opcode::Add => OpKind::Add,
            Opcode::Sub => OpKind::Sub,
            Opcode::Mul => OpKind::Mul,
            Opcode::Div => OpKind::Div,
            Opcode::Rem => OpKind::Rem,
            Opcode::Neg => OpKind::Neg,
            Opcode::And => OpKind::And,
            Opcode::Or => OpKind::Or,
            Opcode::Xor => OpKind::Xor,
            Opcode::Not => OpKind::Not,
            Opcode::Shl => OpKind::Shl,
            Opcode::Shr => OpKind::Shr,
            Opcode::Cmp(_) => OpKind::Cmp,
            Opcode::Select => OpKind::Select,
            Opcode::Mov => OpKind::Mov,
            Opcode::Const(_) => OpKind::Const,
            Opcode::LoadVar(_) => OpKind::LoadVar,
            Opcode::StoreVar(_) => OpKind::StoreVar,
            Opcode::ReadPort(_) => OpKind::ReadPort,
            Opcode::WritePort(_) => OpKind::WritePort,
            Opcode::Goto(_) => OpKind::Goto,
            Opcode::BranchIfTrue(_) => OpKind::BranchIfTrue,
            Opcode::BranchIfFalse(_) => OpKind::BranchIfFalse,
            Opcode::Nop => OpKind::Nop,
        }
    }

    /// Number of operand and result slots the opcode expects.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Cmp(_) => (2, 1),
            Opcode::Neg | Opcode::Not | Opcode::Mov => (1, 1),
            Opcode::Select => (3, 1),
            Opcode::Const(_) | Opcode::LoadVar(_) | Opcode::ReadPort(_) => {
                (0, 1)
            }
            Opcode::StoreVar(_)
            | Opcode::WritePort(_)
            | Opcode::BranchIfTrue(_)
            | Opcode::BranchIfFalse(_) => (1, 0),
            Opcode::Goto(_) | Opcode::Nop => (0, 0),
        }
    }

    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Mul
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Cmp(CmpOp::Eq | CmpOp::Ne)
        )
    }

    pub fn branch_target(&self) -> Option<InstrIdx> {
        match self {
            Opcode::Goto(t)
            | Opcode::BranchIfTrue(t)
            | Opcode::BranchIfFalse(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.branch_target().is_some()
    }

    /// Name of the variable or port the instruction accesses.
    pub fn resource_key(&self) -> Option<&str> {
        match self {
            Opcode::LoadVar(n)
            | Opcode::StoreVar(n)
            | Opcode::ReadPort(n)
            | Opcode::WritePort(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Add => write!(f, "add"),
            Opcode::Sub => write!(f, "sub"),
            Opcode::Mul => write!(f, "mul"),
            Opcode::Div => write!(f, "div"),
            Opcode::Rem => write!(f, "rem"),
            Opcode::Neg => write!(f, "neg"),
            Opcode::And => write!(f, "and"),
            Opcode::Or => write!(f, "or"),
            Opcode::Xor => write!(f, "xor"),
            Opcode::Not => write!(f, "not"),
            Opcode::Shl => write!(f, "shl"),
            Opcode::Shr => write!(f, "shr"),
            Opcode::Cmp(op) => write!(f, "cmp.{}", op.name()),
            Opcode::Select => write!(f, "select"),
            Opcode::Mov => write!(f, "mov"),
            Opcode::Const(v) => write!(f, "const {v}"),
            Opcode::LoadVar(n) => write!(f, "ldvar {n}"),
            Opcode::StoreVar(n) => write!(f, "stvar {n}"),
            Opcode::ReadPort(n) => write!(f, "rdport {n}"),
            Opcode::WritePort(n) => write!(f, "wrport {n}"),
            Opcode::Goto(t) => write!(f, "goto {t}"),
            Opcode::BranchIfTrue(t) => write!(f, "brtrue {t}"),
            Opcode::BranchIfFalse(t) => write!(f, "brfalse {t}"),
            Opcode::Nop => write!(f, "nop"),
        }
    }
}

/// Explicit ordering constraint on an earlier instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrDep {
    /// Issue only once `pred` has completed.
    BeginAfter { pred: InstrIdx },
    /// Complete no earlier than `pred` completes.
    CompleteAfter { pred: InstrIdx },
    /// Issue between `min_delay` and `max_delay` c-steps after `pred` issues.
    Time {
        pred: InstrIdx,
        min_delay: i64,
        max_delay: i64,
    },
}

impl InstrDep {
    pub fn pred(&self) -> InstrIdx {
        match self {
            InstrDep::BeginAfter { pred }
            | InstrDep::CompleteAfter { pred }
            | InstrDep::Time { pred, .. } => *pred,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instr {
    /// Assigned from the position inside the function.
    #[serde(skip)]
    pub index: InstrIdx,
    pub opcode: Opcode,
    #[serde(default)]
    pub operands: SmallVec<[SlotIdx; 3]>,
    #[serde(default)]
    pub results: SmallVec<[SlotIdx; 1]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<InstrDep>,
    /// Offset of the behavioral statement this instruction was generated
    /// from. Only used for diagnostics and profiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<u32>,
}

impl Instr {
    pub fn new(opcode: Opcode, operands: &[usize], results: &[usize]) -> Self {
        Self {
            index: InstrIdx::default(),
            opcode,
            operands: operands.iter().map(|s| SlotIdx::new(*s)).collect(),
            results: results.iter().map(|s| SlotIdx::new(*s)).collect(),
            deps: Vec::new(),
            source: None,
        }
    }

    pub fn with_dep(mut self, dep: InstrDep) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn with_source(mut self, offset: u32) -> Self {
        self.source = Some(offset);
        self
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}) => ({})",
            self.index,
            self.opcode,
            self.operands.iter().join(", "),
            self.results.iter().join(", ")
        )
    }
}
