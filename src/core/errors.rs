use crate::core::time::TimeValue;
use crate::core::types::ComponentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime errors raised by the kernel or by component code.
///
/// A runtime error aborts the current run but leaves the network in a state
/// that can still be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("{0}")]
    Runtime(String),
    #[error("internal consistency violation: {0}")]
    Internal(String),
    #[error("ownership violation: {0}")]
    Ownership(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("parameter error: {0}")]
    Parameter(String),
    #[error("signal error: {0}")]
    Signal(String),
    #[error("gate error: {0}")]
    Gate(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("communication error: {0}")]
    Comm(String),
    #[error("wrong simulation stage: {0}")]
    Stage(String),
    /// Error reported by a peer partition. Never re-broadcast.
    #[error("error in partition {partition}: {message}")]
    Remote { partition: u32, message: String },
    #[error("in component '{path}': {source}")]
    InComponent {
        path: String,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    pub fn runtime(message: impl Into<String>) -> Self {
        SimError::Runtime(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SimError::Internal(message.into())
    }

    /// Attach the path of the component in whose context the error occurred.
    /// Errors that already carry a component path are returned unchanged.
    pub fn in_component(self, path: &str) -> Self {
        match self {
            SimError::InComponent { .. } | SimError::Remote { .. } => self,
            other => SimError::InComponent {
                path: path.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with component context stripped.
    pub fn root_cause(&self) -> &SimError {
        match self {
            SimError::InComponent { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.root_cause(), SimError::Remote { .. })
    }
}

/// Why a run ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    SimTimeLimit,
    EventLimit,
    RealTimeLimit,
    EndedByModel,
    Interrupted,
    RemoteTermination,
}

impl TerminationReason {
    pub fn code(self) -> u8 {
        match self {
            TerminationReason::SimTimeLimit => 1,
            TerminationReason::EventLimit => 2,
            TerminationReason::RealTimeLimit => 3,
            TerminationReason::EndedByModel => 4,
            TerminationReason::Interrupted => 5,
            TerminationReason::RemoteTermination => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => TerminationReason::SimTimeLimit,
            2 => TerminationReason::EventLimit,
            3 => TerminationReason::RealTimeLimit,
            4 => TerminationReason::EndedByModel,
            5 => TerminationReason::Interrupted,
            6 => TerminationReason::RemoteTermination,
            _ => return None,
        })
    }
}

/// Expected end of a run. The only outcome under which a run counts as successful.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Termination {
    pub reason: TerminationReason,
    pub message: String,
}

impl Termination {
    pub fn new(reason: TerminationReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn sim_time_limit(at: TimeValue) -> Self {
        Self::new(
            TerminationReason::SimTimeLimit,
            format!("Simulation time limit reached -- simulation stopped at t={}", at),
        )
    }

    pub fn event_limit(events: u64) -> Self {
        Self::new(
            TerminationReason::EventLimit,
            format!("Event number limit reached -- simulation stopped at event #{}", events),
        )
    }

    pub fn real_time_limit(elapsed_ms: u64) -> Self {
        Self::new(
            TerminationReason::RealTimeLimit,
            format!("Real time limit reached -- simulation stopped after {}ms", elapsed_ms),
        )
    }

    pub fn ended_by_model() -> Self {
        Self::new(TerminationReason::EndedByModel, "Simulation ended by the model")
    }

    pub fn interrupted() -> Self {
        Self::new(TerminationReason::Interrupted, "Simulation stopped by operator request")
    }
}

/// Tagged outcome travelling up the event-processing call chain.
///
/// Keeps termination, failure and the deferred structural request apart
/// instead of folding them into one error hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupt {
    #[error(transparent)]
    Terminated(#[from] Termination),
    #[error(transparent)]
    Failed(#[from] SimError),
    /// Delete the given component once control is back in the kernel.
    #[error("deletion of component {0} requested")]
    DeleteComponent(ComponentId),
    /// The execution context is being torn down together with its component.
    #[error("execution context killed")]
    Killed,
}

impl Interrupt {
    /// Collapse into a runtime error; used where only errors are expected.
    pub fn into_error(self) -> SimError {
        match self {
            Interrupt::Failed(e) => e,
            Interrupt::Terminated(t) => {
                SimError::Stage(format!("termination requested outside the event loop: {}", t))
            }
            Interrupt::DeleteComponent(id) => {
                SimError::Stage(format!("deletion of {} requested outside an event", id))
            }
            Interrupt::Killed => SimError::internal("execution context killed"),
        }
    }
}

pub type SimResult<T = ()> = Result<T, Interrupt>;
