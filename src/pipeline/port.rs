//! Port descriptors for the node system.
//!
//! Each node declares its ports (inputs/outputs) via static `PortDescriptor` arrays.
//! The pipeline uses these to validate edge connections.

use crate::pipeline::data::DataKind;

/// The kind of data flowing through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// Structured image data addressed by extents.
    ImageData,
    /// Polygonal data addressed by pieces.
    PolyData,
    /// Either kind; the concrete kind is decided by whatever is connected.
    Any,
}

impl PortKind {
    /// Whether data of `kind` may flow through this port.
    pub fn accepts(self, kind: DataKind) -> bool {
        match self {
            PortKind::Any => true,
            PortKind::ImageData => kind == DataKind::Image,
            PortKind::PolyData => kind == DataKind::Poly,
        }
    }

    /// Whether an output of kind `self` can feed an input of kind `input`.
    pub fn compatible_with(self, input: PortKind) -> bool {
        self == PortKind::Any || input == PortKind::Any || self == input
    }

    /// The concrete data kind, if the port is not generic.
    pub fn data_kind(self) -> Option<DataKind> {
        match self {
            PortKind::ImageData => Some(DataKind::Image),
            PortKind::PolyData => Some(DataKind::Poly),
            PortKind::Any => None,
        }
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Static descriptor for a node's port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PortKind,
    /// Input ports only: accepts more than one connection.
    pub repeatable: bool,
}

impl PortDescriptor {
    pub const fn input(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind,
            repeatable: false,
        }
    }

    pub const fn repeatable_input(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            kind,
            repeatable: true,
        }
    }

    pub const fn output(name: &'static str, kind: PortKind) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            kind,
            repeatable: false,
        }
    }
}

/// Descriptors of one direction, in declaration order. Ordinals index this list.
pub fn ports_in(ports: &[PortDescriptor], direction: PortDirection) -> Vec<&PortDescriptor> {
    ports.iter().filter(|p| p.direction == direction).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_compatibility() {
        assert!(PortKind::Any.compatible_with(PortKind::ImageData));
        assert!(PortKind::PolyData.compatible_with(PortKind::Any));
        assert!(!PortKind::ImageData.compatible_with(PortKind::PolyData));
        assert!(PortKind::ImageData.accepts(DataKind::Image));
        assert!(!PortKind::ImageData.accepts(DataKind::Poly));
    }

    #[test]
    fn test_ports_in_direction() {
        static PORTS: &[PortDescriptor] = &[
            PortDescriptor::input("in", PortKind::ImageData),
            PortDescriptor::output("out", PortKind::PolyData),
            PortDescriptor::output("mask", PortKind::ImageData),
        ];
        let outputs = ports_in(PORTS, PortDirection::Output);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].name, "mask");
    }
}
