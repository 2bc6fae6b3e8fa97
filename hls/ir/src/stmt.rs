use crate::{OpKind, SignalIdx};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Value {
    Int(i64),
    /// Any value will do. Used for inputs of idle units.
    DontCare,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::DontCare => write!(f, "-"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Const(Value),
    Signal(SignalIdx),
    Op { op: OpKind, args: Vec<Expr> },
}

/// Statement of a unit's behavioral realization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// Concurrent assignment to a signal.
    Store { target: SignalIdx, value: Expr },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    Loop(Vec<Stmt>),
    Call { callee: String, args: Vec<Expr> },
    Comment(String),
    Nop,
}

/// The statements a unit executes during one c-step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Process {
    pub stmts: Vec<Stmt>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, target: SignalIdx, value: Expr) -> &mut Self {
        self.stmts.push(Stmt::Store { target, value });
        self
    }

    pub fn push(&mut self, stmt: Stmt) -> &mut Self {
        self.stmts.push(stmt);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}
