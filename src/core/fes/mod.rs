//! Future event set: the time-ordered store of pending events.
//!
//! Ordering is by arrival time, then priority (lower value first), then
//! insertion order. Insertion order is assigned by the set itself, so two
//! events with equal time and priority come out in the order they went in.

pub mod event_heap;
pub mod lazy_queue;

pub use event_heap::EventHeap;
pub use lazy_queue::LazyEventQueue;

use crate::core::event::Event;
use crate::core::types::EventId;
use serde::{Deserialize, Serialize};

pub trait FutureEventSet: Send {
    /// Insert a new event, assigning it the next insertion sequence number
    fn insert(&mut self, event: Event);

    /// Re-insert an event previously extracted, keeping its sequence number
    fn put_back(&mut self, event: Event);

    /// Remove a pending event. Removing an absent id is a no-op.
    fn remove(&mut self, id: EventId) -> Option<Event>;

    fn peek_first(&self) -> Option<&Event>;

    fn extract_first(&mut self) -> Option<Event>;

    fn contains(&self, id: EventId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending event
    fn clear(&mut self);

    /// Pending events in unspecified order
    fn iter(&self) -> Box<dyn Iterator<Item = &Event> + '_>;
}

/// Which future event set implementation a kernel uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FesKind {
    /// Indexed binary heap with eager removal
    #[default]
    Heap,
    /// Binary heap with lazy removal of cancelled entries
    Lazy,
}

impl FesKind {
    pub fn create(self) -> Box<dyn FutureEventSet> {
        match self {
            FesKind::Heap => Box::new(EventHeap::new()),
            FesKind::Lazy => Box::new(LazyEventQueue::new()),
        }
    }
}
