use crate::{
    Flow, FuClass, ParFlow, ResourceKind, SignalIdx, SignalKind, SignalTable,
    SlotIdx, Unit, UnitIdx, Value,
};
use hls_utils::{IndexedMap, NameGenerator};

/// Port layout of a unit to be instantiated.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortCounts {
    pub inputs: usize,
    pub outputs: usize,
    pub controls: usize,
}

/// The hardware being built: every signal and every unit instance. All
/// cross-references are indices into these arenas.
#[derive(Debug, Default)]
pub struct Design {
    pub signals: SignalTable,
    pub units: IndexedMap<UnitIdx, Unit>,
    names: NameGenerator,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates a unit together with its port signals.
    pub fn add_unit(
        &mut self,
        class: FuClass,
        key: Option<String>,
        width: u32,
        ports: PortCounts,
        resource: ResourceKind,
    ) -> UnitIdx {
        let prefix = match &key {
            Some(k) => format!("{class}_{k}"),
            None => class.to_string(),
        };
        let name = self.names.gen_name(&prefix);
        let unit = self.units.peek_next_idx();
        let mut port = |dir: &str, i: usize, width: u32, kind: SignalKind| {
            self.signals.add(format!("{name}.{dir}{i}"), width, kind)
        };
        let inputs = (0..ports.inputs)
            .map(|port_no| {
                port("in", port_no, width, SignalKind::Input { unit, port: port_no })
            })
            .collect();
        let outputs = (0..ports.outputs)
            .map(|port_no| {
                port("out", port_no, width, SignalKind::Output { unit, port: port_no })
            })
            .collect();
        let controls = (0..ports.controls)
            .map(|port_no| {
                port("ctl", port_no, 4, SignalKind::Control { unit, port: port_no })
            })
            .collect();
        log::debug!("instantiated {name} ({class}, {width} bits)");
        self.units.push(Unit {
            name,
            class,
            key,
            width,
            resource,
            inputs,
            outputs,
            controls,
        })
    }

    pub fn unit(&self, idx: UnitIdx) -> &Unit {
        &self.units[idx]
    }

    pub fn add_temporary(&mut self, slot: SlotIdx, width: u32) -> SignalIdx {
        self.signals
            .add(format!("t{slot}"), width, SignalKind::Temporary(slot))
    }

    pub fn add_interlink(&mut self, slot: SlotIdx, width: u32) -> SignalIdx {
        self.signals
            .add(format!("link{slot}"), width, SignalKind::Interlink(slot))
    }

    /// Flows that keep `unit` idle: operands are don't-care and controls are
    /// deasserted.
    pub fn do_nothing(&self, unit: UnitIdx) -> ParFlow {
        let unit = &self.units[unit];
        ParFlow::from_flows(
            unit.inputs
                .iter()
                .map(|s| Flow::value(*s, Value::DontCare))
                .chain(unit.controls.iter().map(|s| Flow::value(*s, Value::Int(0)))),
        )
    }
}
