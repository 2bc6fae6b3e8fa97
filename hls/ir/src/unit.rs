use crate::SignalIdx;
use hls_utils::impl_index;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// An instantiated functional unit in the [Design](crate::Design).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct UnitIdx(u32);
impl_index!(UnitIdx);

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FuClass {
    Adder,
    Multiplier,
    Divider,
    Logic,
    Shifter,
    Comparator,
    Mux,
    Wire,
    Constant,
    Variable,
    Port,
    Control,
    Register,
}

impl FuClass {
    pub const ALL: [FuClass; 13] = [
        FuClass::Adder,
        FuClass::Multiplier,
        FuClass::Divider,
        FuClass::Logic,
        FuClass::Shifter,
        FuClass::Comparator,
        FuClass::Mux,
        FuClass::Wire,
        FuClass::Constant,
        FuClass::Variable,
        FuClass::Port,
        FuClass::Control,
        FuClass::Register,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FuClass::Adder => "adder",
            FuClass::Multiplier => "multiplier",
            FuClass::Divider => "divider",
            FuClass::Logic => "logic",
            FuClass::Shifter => "shifter",
            FuClass::Comparator => "comparator",
            FuClass::Mux => "mux",
            FuClass::Wire => "wire",
            FuClass::Constant => "constant",
            FuClass::Variable => "variable",
            FuClass::Port => "port",
            FuClass::Control => "control",
            FuClass::Register => "register",
        }
    }
}

impl fmt::Display for FuClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FuClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FuClass::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown functional unit class `{s}'"))
    }
}

/// How instances of a unit may be shared between instructions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Exactly one instance exists (a variable's register, a port).
    Exclusive,
    /// Instances may be replicated and shared in time.
    Shared,
    /// So cheap that every instruction gets its own instance.
    Lightweight,
}

/// Timing and sharing characteristics of the unit realizing an instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FuSpec {
    pub class: FuClass,
    /// C-steps from issue to result.
    pub latency: i64,
    /// C-steps the unit stays busy after issue.
    pub initiation_interval: i64,
    pub resource: ResourceKind,
}

/// Resource class of an instruction. Instructions of equal class compete for
/// the same pool of units.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InstrClass {
    pub class: FuClass,
    /// Variable or port name for exclusive resources.
    pub key: Option<String>,
}

impl fmt::Display for InstrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}:{key}", self.class),
            None => write!(f, "{}", self.class),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Unit {
    pub name: String,
    pub class: FuClass,
    pub key: Option<String>,
    pub width: u32,
    pub resource: ResourceKind,
    pub inputs: Vec<SignalIdx>,
    pub outputs: Vec<SignalIdx>,
    /// Operation selects and write enables.
    pub controls: Vec<SignalIdx>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_round_trip() {
        for class in FuClass::ALL {
            assert_eq!(class.name().parse::<FuClass>(), Ok(class));
        }
        assert!("alu".parse::<FuClass>().is_err());
        let ic = InstrClass {
            class: FuClass::Variable,
            key: Some("x".into()),
        };
        assert_eq!(ic.to_string(), "variable:x");
    }
}
