pub mod component;
pub mod component_type;
pub mod context;
pub mod gates;
pub mod ownership;
pub mod params;
pub mod registry;
pub mod signals;

// Re-export commonly used types
pub use component::{
    ActivityFn, Behavior, Channel, ChannelOutcome, Component, ComponentKind, DelayChannel, Module,
};
pub use component_type::{ComponentType, TypeRegistry, DELAY_CHANNEL};
pub use context::{ModuleContext, SimContext};
pub use gates::{Gate, GateDecl, GateDirection};
pub use ownership::Owner;
pub use params::{ParamDecl, ParamImpl, ParamSet, ParamType, ParamValue};
pub use registry::ComponentRegistry;
pub use signals::{ModelChange, SignalDecl, SignalListener, SignalObject, SignalType, SignalValue};
