pub mod config;
pub mod coroutine;
pub mod environment;
pub mod fingerprint;
pub mod lifecycle;
pub mod messaging;
pub mod network;
pub mod runner;
pub mod simulation;

// Re-export commonly used types
pub use config::{KernelConfig, ParsimConfig, SchedulerKind};
pub use coroutine::{ActivityContext, ContextState, ExecutionContext};
pub use environment::{Environment, NullEnvironment, ParameterEnvironment};
pub use lifecycle::{LifecycleEvent, LifecycleListener, LifecycleNotice};
pub use network::{BuildContext, ChannelSpec};
pub use runner::{run_parallel, run_partitions, run_simulation, RunLimit, RunReport, RunStatus};
pub use simulation::{Simulation, Stage};
