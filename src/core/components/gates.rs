use crate::core::types::{ComponentId, GateRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDirection {
    Input,
    Output,
}

/// Declaration of a gate or gate vector on a component type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecl {
    pub name: String,
    pub direction: GateDirection,
    /// `Some(n)` declares a vector of `n` gates
    pub vector_size: Option<u32>,
}

impl GateDecl {
    pub fn input(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: GateDirection::Input,
            vector_size: None,
        }
    }

    pub fn output(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: GateDirection::Output,
            vector_size: None,
        }
    }

    pub fn vector(mut self, size: u32) -> Self {
        self.vector_size = Some(size);
        self
    }

    /// Expand into the individual gates of a component instance
    pub(crate) fn instantiate(&self) -> Vec<Gate> {
        match self.vector_size {
            None => vec![Gate::new(&self.name, None, self.direction)],
            Some(n) => (0..n)
                .map(|i| Gate::new(&self.name, Some(i), self.direction))
                .collect(),
        }
    }
}

/// One gate of a component instance.
///
/// Connections form chains: an output gate's `next` points at the gate the
/// message travels to, and that gate's `prev` points back. A channel, if
/// any, sits on the connection leaving this gate.
#[derive(Debug, Clone)]
pub struct Gate {
    name: String,
    index: Option<u32>,
    direction: GateDirection,
    pub(crate) next: Option<GateRef>,
    pub(crate) prev: Option<GateRef>,
    pub(crate) channel: Option<ComponentId>,
}

impl Gate {
    fn new(name: &str, index: Option<u32>, direction: GateDirection) -> Self {
        Self {
            name: name.to_string(),
            index,
            direction,
            next: None,
            prev: None,
            channel: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn full_name(&self) -> String {
        match self.index {
            Some(i) => format!("{}[{}]", self.name, i),
            None => self.name.clone(),
        }
    }

    pub fn direction(&self) -> GateDirection {
        self.direction
    }

    pub fn next(&self) -> Option<GateRef> {
        self.next
    }

    pub fn prev(&self) -> Option<GateRef> {
        self.prev
    }

    pub fn channel(&self) -> Option<ComponentId> {
        self.channel
    }

    pub fn is_connected_outside(&self) -> bool {
        match self.direction {
            GateDirection::Output => self.next.is_some(),
            GateDirection::Input => self.prev.is_some(),
        }
    }

    pub(crate) fn matches(&self, name: &str, index: Option<u32>) -> bool {
        self.name == name && self.index == index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_expansion() {
        let gates = GateDecl::output("out").vector(3).instantiate();
        assert_eq!(gates.len(), 3);
        assert_eq!(gates[2].full_name(), "out[2]");
        assert!(gates[1].matches("out", Some(1)));
        assert!(!gates[1].matches("out", None));
    }

    #[test]
    fn test_scalar_gate_is_unconnected() {
        let gates = GateDecl::input("in").instantiate();
        assert_eq!(gates.len(), 1);
        assert!(!gates[0].is_connected_outside());
        assert_eq!(gates[0].direction(), GateDirection::Input);
    }
}
