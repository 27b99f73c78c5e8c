pub mod core;

// Re-export commonly used types
pub use crate::core::components::{
    ComponentKind, ComponentType, GateDecl, Module, ModuleContext, ParamDecl, ParamType,
    ParamValue, SignalDecl, SignalType, SignalValue, SimContext, TypeRegistry,
};
pub use crate::core::errors::{Interrupt, SimError, SimResult, Termination, TerminationReason};
pub use crate::core::event::Message;
pub use crate::core::execution::{
    run_simulation, ActivityContext, ChannelSpec, KernelConfig, RunLimit, RunStatus, Simulation,
};
pub use crate::core::time::TimeValue;
pub use crate::core::types::{ComponentId, EventId};
