use crate::core::errors::SimError;
use crate::core::time::TimeValue;
use std::sync::Arc;
use uuid::Uuid;

/// Points in a kernel's life at which lifecycle listeners are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PreNetworkSetup,
    PostNetworkSetup,
    PreNetworkInitialize,
    PostNetworkInitialize,
    OnSimulationStart,
    OnSimulationPause,
    OnSimulationResume,
    OnSimulationSuccess,
    OnSimulationError,
    PreNetworkFinish,
    PostNetworkFinish,
    PreNetworkDelete,
    PostNetworkDelete,
}

/// What a listener gets told alongside the event
#[derive(Debug, Clone)]
pub struct LifecycleNotice {
    pub event: LifecycleEvent,
    pub run_id: Uuid,
    pub sim_time: TimeValue,
    /// Network type name, termination message or error text, as applicable
    pub detail: Option<String>,
}

/// Observer of kernel lifecycle transitions
pub trait LifecycleListener: Send + Sync {
    fn lifecycle_event(&self, notice: &LifecycleNotice) -> Result<(), SimError>;

    fn listener_added(&self) {}

    fn listener_removed(&self) {}
}

/// Ordered, duplicate-free list of lifecycle listeners
#[derive(Default)]
pub struct LifecycleListeners {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

fn same_listener(a: &Arc<dyn LifecycleListener>, b: &Arc<dyn LifecycleListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl LifecycleListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; adding the same one twice is a no-op
    pub fn add(&mut self, listener: Arc<dyn LifecycleListener>) {
        if self.listeners.iter().any(|l| same_listener(l, &listener)) {
            return;
        }
        listener.listener_added();
        self.listeners.push(listener);
    }

    pub fn remove(&mut self, listener: &Arc<dyn LifecycleListener>) -> bool {
        match self.listeners.iter().position(|l| same_listener(l, listener)) {
            Some(pos) => {
                let removed = self.listeners.remove(pos);
                removed.listener_removed();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Listeners as of now; notification iterates over this copy so that
    /// listeners may add or remove listeners while being notified
    pub fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.clone()
    }

    pub fn clear(&mut self) {
        for l in self.listeners.drain(..) {
            l.listener_removed();
        }
    }
}
