use super::FutureEventSet;
use crate::core::event::Event;
use crate::core::types::EventId;
use std::collections::HashMap;

/// Binary min-heap with a position index, giving O(log n) removal by id
pub struct EventHeap {
    heap: Vec<Event>,
    positions: HashMap<EventId, usize>,
    insert_counter: u64,
}

impl EventHeap {
    /// Create a new empty heap
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            positions: HashMap::new(),
            insert_counter: 0,
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].sort_key() < self.heap[b].sort_key()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].id, a);
        self.positions.insert(self.heap[b].id, b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn push(&mut self, event: Event) {
        let pos = self.heap.len();
        self.positions.insert(event.id, pos);
        self.heap.push(event);
        self.sift_up(pos);
    }

    fn take_at(&mut self, pos: usize) -> Option<Event> {
        let last = self.heap.len().checked_sub(1)?;
        if pos != last {
            self.swap(pos, last);
        }
        let event = self.heap.pop()?;
        self.positions.remove(&event.id);
        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
        Some(event)
    }
}

impl Default for EventHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureEventSet for EventHeap {
    fn insert(&mut self, mut event: Event) {
        event.insert_seq = self.insert_counter;
        self.insert_counter += 1;
        self.push(event);
    }

    fn put_back(&mut self, event: Event) {
        self.push(event);
    }

    fn remove(&mut self, id: EventId) -> Option<Event> {
        let pos = *self.positions.get(&id)?;
        self.take_at(pos)
    }

    fn peek_first(&self) -> Option<&Event> {
        self.heap.first()
    }

    fn extract_first(&mut self) -> Option<Event> {
        self.take_at(0)
    }

    fn contains(&self, id: EventId) -> bool {
        self.positions.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Event> + '_> {
        Box::new(self.heap.iter())
    }
}
