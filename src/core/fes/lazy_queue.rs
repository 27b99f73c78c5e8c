use super::FutureEventSet;
use crate::core::event::Event;
use crate::core::time::TimeValue;
use crate::core::types::EventId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct QueueKey {
    arrival: TimeValue,
    priority: i16,
    sequence_num: u64,
    id: EventId,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_num == other.sequence_num && self.id == other.id
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .arrival
            .cmp(&self.arrival)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Binary heap of keys with the events kept alongside by id.
///
/// Removing an event takes it out of the id map immediately and leaves its
/// key in the heap as stale. A key is live only while the map holds an event
/// with the same id and sequence number; stale keys are discarded when they
/// reach the top, so the top key always refers to a live event.
pub struct LazyEventQueue {
    keys: BinaryHeap<QueueKey>,
    events: HashMap<EventId, Event>,
    stale: HashSet<(EventId, u64)>,
    sequence_counter: u64,
}

impl LazyEventQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self {
            keys: BinaryHeap::new(),
            events: HashMap::new(),
            stale: HashSet::new(),
            sequence_counter: 0,
        }
    }

    /// Number of cancelled keys not yet physically removed
    pub fn stale_count(&self) -> usize {
        self.stale.len()
    }

    fn push(&mut self, event: Event) {
        self.keys.push(QueueKey {
            arrival: event.arrival,
            priority: event.priority,
            sequence_num: event.insert_seq,
            id: event.id,
        });
        self.events.insert(event.id, event);
    }

    fn is_live(&self, key: &QueueKey) -> bool {
        self.events
            .get(&key.id)
            .map_or(false, |e| e.insert_seq == key.sequence_num)
    }

    fn purge_stale_top(&mut self) {
        while let Some(top) = self.keys.peek().copied() {
            if self.is_live(&top) {
                break;
            }
            self.stale.remove(&(top.id, top.sequence_num));
            self.keys.pop();
        }
    }
}

impl Default for LazyEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureEventSet for LazyEventQueue {
    fn insert(&mut self, mut event: Event) {
        event.insert_seq = self.sequence_counter;
        self.sequence_counter += 1;
        self.push(event);
    }

    fn put_back(&mut self, event: Event) {
        self.push(event);
    }

    fn remove(&mut self, id: EventId) -> Option<Event> {
        let event = self.events.remove(&id)?;
        self.stale.insert((id, event.insert_seq));
        self.purge_stale_top();
        Some(event)
    }

    fn peek_first(&self) -> Option<&Event> {
        self.keys.peek().and_then(|k| self.events.get(&k.id))
    }

    fn extract_first(&mut self) -> Option<Event> {
        self.purge_stale_top();
        let key = self.keys.pop()?;
        let event = self.events.remove(&key.id);
        self.purge_stale_top();
        event
    }

    fn contains(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.events.clear();
        self.stale.clear();
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Event> + '_> {
        Box::new(self.events.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Message;

    fn ev(id: u64, t: i64) -> Event {
        let mut m = Message::new("m");
        m.arrival_time = TimeValue::from_secs(t);
        Event::message(EventId::new(id), m)
    }

    #[test]
    fn test_stale_keys_are_skipped() {
        let mut q = LazyEventQueue::new();
        q.insert(ev(1, 1));
        q.insert(ev(2, 2));
        q.insert(ev(3, 3));
        q.remove(EventId::new(2));
        assert_eq!(q.stale_count(), 1);
        assert_eq!(q.extract_first().map(|e| e.id().raw()), Some(1));
        // key of #2 reached the top and got purged
        assert_eq!(q.stale_count(), 0);
        assert_eq!(q.peek_first().map(|e| e.id().raw()), Some(3));
    }
}
