use crate::core::components::params::ParamValue;
use crate::core::components::signals::SignalValue;
use crate::core::errors::SimError;
use crate::core::event::{Event, Message};
use crate::core::pattern::PathPattern;
use crate::core::types::ComponentId;
use log::warn;

/// Hooks through which the kernel reports to, and reads from, its host.
///
/// Every hook has a do-nothing default, so hosts implement only what they
/// care about.
pub trait Environment: Send {
    fn component_created(&mut self, _id: ComponentId, _path: &str) {}

    fn component_deleted(&mut self, _id: ComponentId, _path: &str) {}

    fn message_scheduled(&mut self, _msg: &Message) {}

    fn message_cancelled(&mut self, _msg: &Message) {}

    fn begin_send(&mut self, _msg: &Message) {}

    fn simulation_event(&mut self, _event: &Event) {}

    fn signal_emitted(&mut self, _source: ComponentId, _signal: &str, _value: &SignalValue) {}

    /// Value for parameter `name` of the component at `path`, if configured
    fn read_parameter(&mut self, _path: &str, _name: &str) -> Option<ParamValue> {
        None
    }

    /// Seed override for the random stream of the component at `path`
    fn rng_seed(&mut self, _path: &str) -> Option<u64> {
        None
    }

    /// Error raised while tearing a network down; teardown continues
    fn teardown_error(&mut self, err: &SimError) {
        warn!("error during cleanup: {}", err);
    }
}

/// Environment that ignores everything
#[derive(Debug, Default)]
pub struct NullEnvironment;

impl Environment for NullEnvironment {}

/// Environment answering parameter reads from pattern-based assignments,
/// in the style of `**.host[*].delay = 10ms`
#[derive(Debug, Default)]
pub struct ParameterEnvironment {
    assignments: Vec<(PathPattern, ParamValue)>,
    seeds: Vec<(PathPattern, u64)>,
}

impl ParameterEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to every parameter whose `component.path.param` name
    /// matches `pattern`. Earlier assignments take precedence.
    pub fn assign(mut self, pattern: &str, value: ParamValue) -> Self {
        self.assignments.push((PathPattern::new(pattern), value));
        self
    }

    pub fn seed(mut self, pattern: &str, seed: u64) -> Self {
        self.seeds.push((PathPattern::new(pattern), seed));
        self
    }
}

impl Environment for ParameterEnvironment {
    fn read_parameter(&mut self, path: &str, name: &str) -> Option<ParamValue> {
        let full = format!("{}.{}", path, name);
        self.assignments
            .iter()
            .find(|(p, _)| p.matches(&full))
            .map(|(_, v)| v.clone())
    }

    fn rng_seed(&mut self, path: &str) -> Option<u64> {
        self.seeds.iter().find(|(p, _)| p.matches(path)).map(|(_, s)| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_assignment_wins() {
        let mut env = ParameterEnvironment::new()
            .assign("net.a.delay", ParamValue::Int(1))
            .assign("**.delay", ParamValue::Int(2));
        assert_eq!(env.read_parameter("net.a", "delay"), Some(ParamValue::Int(1)));
        assert_eq!(env.read_parameter("net.b", "delay"), Some(ParamValue::Int(2)));
        assert_eq!(env.read_parameter("net.b", "rate"), None);
    }

    #[test]
    fn test_null_environment_reads_nothing() {
        let mut env = NullEnvironment;
        assert_eq!(env.read_parameter("net", "x"), None);
        assert_eq!(env.rng_seed("net"), None);
    }
}
