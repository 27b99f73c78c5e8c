use crate::core::errors::SimError;
use serde::{Deserialize, Serialize};

/// Dense numeric component identifier, assigned by the registry starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Create a component id from its raw value
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Create a handle for a scalar gate of this component
    pub fn gate(self, name: &str) -> GateAddr {
        GateAddr {
            component: self,
            name: name.to_string(),
            index: None,
        }
    }

    /// Create a handle for one element of a gate vector
    pub fn gate_at(self, name: &str, index: u32) -> GateAddr {
        GateAddr {
            component: self,
            name: name.to_string(),
            index: Some(index),
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a scheduled event, unique within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub(crate) u64);

impl EventId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ev{}", self.0)
    }
}

/// Handle naming a gate by component, gate name and optional vector index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GateAddr {
    pub(crate) component: ComponentId,
    pub(crate) name: String,
    pub(crate) index: Option<u32>,
}

impl GateAddr {
    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

impl std::fmt::Display for GateAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}.{}[{}]", self.component, self.name, i),
            None => write!(f, "{}.{}", self.component, self.name),
        }
    }
}

/// Resolved gate: component plus position in its gate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateRef {
    pub component: ComponentId,
    pub gate: usize,
}

/// Source of run-unique numbers (event ids and the like).
///
/// In a partitioned run each partition draws from its own slice of the
/// number space so that numbers never collide across partitions.
#[derive(Debug, Clone)]
pub struct UniqueNumbers {
    next: u64,
    end: u64,
}

impl UniqueNumbers {
    /// The whole number space
    pub fn new() -> Self {
        Self { next: 1, end: u64::MAX }
    }

    /// The slice of the number space belonging to `rank` out of `count` partitions
    pub fn for_partition(rank: u32, count: u32) -> Result<Self, SimError> {
        if count == 0 || rank >= count {
            return Err(SimError::Config(format!(
                "invalid partition rank {} of {}",
                rank, count
            )));
        }
        let span = u64::MAX / count as u64;
        let start = span * rank as u64;
        Ok(Self {
            next: start.max(1),
            end: start + span,
        })
    }

    pub fn next(&mut self) -> Result<u64, SimError> {
        if self.next >= self.end {
            return Err(SimError::Runtime("unique number range exhausted".to_string()));
        }
        let n = self.next;
        self.next += 1;
        Ok(n)
    }

    pub fn next_event_id(&mut self) -> Result<EventId, SimError> {
        self.next().map(EventId)
    }

    /// Restart the range from its beginning
    pub fn reset_to(&mut self, other: &UniqueNumbers) {
        self.next = other.next;
        self.end = other.end;
    }
}

impl Default for UniqueNumbers {
    fn default() -> Self {
        Self::new()
    }
}
