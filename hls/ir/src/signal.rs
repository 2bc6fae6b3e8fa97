use crate::{SlotIdx, UnitIdx};
use hls_utils::{IndexedMap, impl_index};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SignalIdx(u32);
impl_index!(SignalIdx);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SignalKind {
    Input { unit: UnitIdx, port: usize },
    Output { unit: UnitIdx, port: usize },
    Control { unit: UnitIdx, port: usize },
    /// Endpoint standing for a value slot while units are being chosen.
    Interlink(SlotIdx),
    /// Wire carrying a value slot between its producer and its consumers.
    /// Temporaries are resolved to wiring or registers by the interconnect.
    Temporary(SlotIdx),
}

#[derive(Clone, Debug)]
pub struct Signal {
    pub name: String,
    pub width: u32,
    pub kind: SignalKind,
}

/// Arena of all signals of a design.
#[derive(Clone, Debug, Default)]
pub struct SignalTable {
    signals: IndexedMap<SignalIdx, Signal>,
}

impl SignalTable {
    pub fn add<S: Into<String>>(
        &mut self,
        name: S,
        width: u32,
        kind: SignalKind,
    ) -> SignalIdx {
        self.signals.push(Signal {
            name: name.into(),
            width,
            kind,
        })
    }

    pub fn get(&self, idx: SignalIdx) -> &Signal {
        &self.signals[idx]
    }

    pub fn name(&self, idx: SignalIdx) -> &str {
        &self.signals[idx].name
    }

    pub fn kind(&self, idx: SignalIdx) -> SignalKind {
        self.signals[idx].kind
    }

    pub fn temporary_slot(&self, idx: SignalIdx) -> Option<SlotIdx> {
        match self.signals[idx].kind {
            SignalKind::Temporary(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn interlink_slot(&self, idx: SignalIdx) -> Option<SlotIdx> {
        match self.signals[idx].kind {
            SignalKind::Interlink(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalIdx, &Signal)> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
