use crate::core::components::component_type::ComponentType;
use crate::core::components::context::ModuleContext;
use crate::core::components::gates::Gate;
use crate::core::components::params::ParamSet;
use crate::core::components::signals::SignalListener;
use crate::core::errors::{SimError, SimResult};
use crate::core::event::Message;
use crate::core::execution::coroutine::ActivityContext;
use crate::core::pattern::PathPattern;
use crate::core::rng::ComponentRng;
use crate::core::time::TimeValue;
use crate::core::types::ComponentId;
use std::sync::Arc;

/// Event-callback behavior of a simple module.
///
/// Every method runs to completion inside the kernel's call; the module
/// talks to the simulation only through the context it is handed.
pub trait Module: Send {
    /// Number of initialization stages this module takes part in
    fn num_init_stages(&self) -> u32 {
        1
    }

    fn initialize(&mut self, _ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, msg: Message) -> SimResult;

    fn finish(&mut self, _ctx: &mut ModuleContext<'_>) -> SimResult {
        Ok(())
    }
}

/// Procedure of an activity module, run in its own execution context
pub type ActivityFn = Box<dyn FnOnce(&mut ActivityContext) -> SimResult + Send>;

/// What a channel decided about a message passing through it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub delay: TimeValue,
    pub discard: bool,
}

impl ChannelOutcome {
    pub fn pass(delay: TimeValue) -> Self {
        Self { delay, discard: false }
    }

    pub fn discard() -> Self {
        Self {
            delay: TimeValue::ZERO,
            discard: true,
        }
    }
}

/// Behavior of a channel component sitting on a connection
pub trait Channel: Send {
    fn process_message(
        &mut self,
        msg: &Message,
        params: &ParamSet,
        now: TimeValue,
    ) -> Result<ChannelOutcome, SimError>;
}

/// Channel that delays messages by its `delay` parameter and drops them
/// while `disabled` is set
#[derive(Debug, Default)]
pub struct DelayChannel;

impl Channel for DelayChannel {
    fn process_message(
        &mut self,
        _msg: &Message,
        params: &ParamSet,
        _now: TimeValue,
    ) -> Result<ChannelOutcome, SimError> {
        if params.value("disabled")?.as_bool()? {
            return Ok(ChannelOutcome::discard());
        }
        let delay = params.value("delay")?.as_time()?;
        if delay < TimeValue::ZERO {
            return Err(SimError::Parameter(format!("negative channel delay {}", delay)));
        }
        Ok(ChannelOutcome::pass(delay))
    }
}

/// Behavior produced by a component type's factory
pub enum Behavior {
    /// A module whose behavior is its submodules
    Compound,
    Simple(Box<dyn Module>),
    Activity(ActivityFn),
    Channel(Box<dyn Channel>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Compound,
    Simple,
    Activity,
    Channel,
    /// Stand-in for a module that lives in another partition
    Placeholder,
}

impl Behavior {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Behavior::Compound => ComponentKind::Compound,
            Behavior::Simple(_) => ComponentKind::Simple,
            Behavior::Activity(_) => ComponentKind::Activity,
            Behavior::Channel(_) => ComponentKind::Channel,
        }
    }
}

/// Behavior as stored in the registry; taken out while it executes
pub(crate) enum BehaviorSlot {
    Compound,
    Simple(Option<Box<dyn Module>>),
    /// The procedure is consumed when the execution context starts
    Activity(Option<ActivityFn>),
    Channel(Option<Box<dyn Channel>>),
    Placeholder { partition: u32 },
}

impl BehaviorSlot {
    pub(crate) fn from_behavior(behavior: Behavior) -> Self {
        match behavior {
            Behavior::Compound => BehaviorSlot::Compound,
            Behavior::Simple(m) => BehaviorSlot::Simple(Some(m)),
            Behavior::Activity(a) => BehaviorSlot::Activity(Some(a)),
            Behavior::Channel(c) => BehaviorSlot::Channel(Some(c)),
        }
    }

    fn kind(&self) -> ComponentKind {
        match self {
            BehaviorSlot::Compound => ComponentKind::Compound,
            BehaviorSlot::Simple(_) => ComponentKind::Simple,
            BehaviorSlot::Activity(_) => ComponentKind::Activity,
            BehaviorSlot::Channel(_) => ComponentKind::Channel,
            BehaviorSlot::Placeholder { .. } => ComponentKind::Placeholder,
        }
    }
}

/// A registered component: identity, type, parameters, gates and behavior.
///
/// Parent and children are kept by the registry's ownership tree.
pub struct Component {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) index: Option<u32>,
    pub(crate) ty: Arc<ComponentType>,
    pub(crate) params: ParamSet,
    pub(crate) gates: Vec<Gate>,
    pub(crate) behavior: BehaviorSlot,
    pub(crate) listeners: Vec<(PathPattern, Box<dyn SignalListener>)>,
    pub(crate) initialized: bool,
    pub(crate) finished: bool,
    pub(crate) rng: ComponentRng,
}

impl Component {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Name with the vector index, e.g. `host[3]`
    pub fn full_name(&self) -> String {
        match self.index {
            Some(i) => format!("{}[{}]", self.name, i),
            None => self.name.clone(),
        }
    }

    pub fn component_type(&self) -> &Arc<ComponentType> {
        &self.ty
    }

    pub fn kind(&self) -> ComponentKind {
        self.behavior.kind()
    }

    pub fn is_channel(&self) -> bool {
        self.kind() == ComponentKind::Channel
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind() == ComponentKind::Placeholder
    }

    /// Partition hosting the real module behind a placeholder
    pub fn remote_partition(&self) -> Option<u32> {
        match self.behavior {
            BehaviorSlot::Placeholder { partition } => Some(partition),
            _ => None,
        }
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn gate(&self, index: usize) -> Option<&Gate> {
        self.gates.get(index)
    }

    pub fn find_gate(&self, name: &str, index: Option<u32>) -> Option<usize> {
        self.gates.iter().position(|g| g.matches(name, index))
    }

    /// Number of gates in the vector `name`, 0 if there is none
    pub fn gate_size(&self, name: &str) -> usize {
        self.gates
            .iter()
            .filter(|g| g.name() == name && g.index().is_some())
            .count()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) fn num_init_stages(&self) -> u32 {
        match &self.behavior {
            BehaviorSlot::Simple(Some(m)) => m.num_init_stages(),
            _ => 0,
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.full_name())
            .field("type", &self.ty.qualified_name())
            .field("kind", &self.kind())
            .finish()
    }
}
