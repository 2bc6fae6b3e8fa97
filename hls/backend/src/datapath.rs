use hls_ir::{Design, UnitIdx};
use hls_opt::DatapathBuilder;
use itertools::Itertools;
use std::fmt::Write;

/// Records the units of the datapath in instantiation order.
#[derive(Default, Debug)]
pub struct DefaultDatapathBuilder {
    units: Vec<UnitIdx>,
}

impl DefaultDatapathBuilder {
    pub fn units(&self) -> &[UnitIdx] {
        &self.units
    }

    /// One line per unit with its ports.
    pub fn report(&self, design: &Design) -> String {
        let mut out = String::new();
        for unit in &self.units {
            let u = design.unit(*unit);
            let ports = u
                .inputs
                .iter()
                .chain(&u.controls)
                .chain(&u.outputs)
                .map(|s| design.signals.name(*s))
                .join(", ");
            let _ = writeln!(out, "{} ({}, {} bits): {ports}", u.name, u.class, u.width);
        }
        out
    }
}

impl DatapathBuilder for DefaultDatapathBuilder {
    fn add_unit(&mut self, design: &Design, unit: UnitIdx) {
        log::debug!("datapath: {}", design.unit(unit).name);
        self.units.push(unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hls_ir::{FuClass, PortCounts, ResourceKind};

    #[test]
    fn lists_units_with_ports() {
        let mut design = Design::new();
        let reg = design.add_unit(
            FuClass::Register,
            None,
            8,
            PortCounts {
                inputs: 1,
                outputs: 1,
                controls: 1,
            },
            ResourceKind::Shared,
        );
        let mut builder = DefaultDatapathBuilder::default();
        builder.add_unit(&design, reg);
        assert_eq!(builder.units(), &[reg]);
        assert_eq!(
            builder.report(&design),
            "register (register, 8 bits): register.in0, register.ctl0, register.out0\n"
        );
    }
}
