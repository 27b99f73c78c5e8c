use crate::core::components::ownership::Owner;
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId};
use std::any::Any;
use std::fmt;

/// Priority of the end-of-simulation event: after every other event at the same time
pub const END_SIMULATION_PRIORITY: i16 = i16::MAX;

/// A message travelling between components, or scheduled by a component to itself
pub struct Message {
    name: String,
    kind: i16,
    priority: i16,
    payload: Option<Box<dyn Any + Send>>,
    pub(crate) event_id: Option<EventId>,
    pub(crate) sender: Option<ComponentId>,
    pub(crate) sender_gate: Option<usize>,
    pub(crate) arrival_component: Option<ComponentId>,
    pub(crate) arrival_gate: Option<usize>,
    pub(crate) sending_time: TimeValue,
    pub(crate) arrival_time: TimeValue,
    timestamp: TimeValue,
    pub(crate) owner: Owner,
    pub(crate) self_message: bool,
}

impl Message {
    /// Create a new unowned message
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            priority: 0,
            payload: None,
            event_id: None,
            sender: None,
            sender_gate: None,
            arrival_component: None,
            arrival_gate: None,
            sending_time: TimeValue::ZERO,
            arrival_time: TimeValue::ZERO,
            timestamp: TimeValue::ZERO,
            owner: Owner::Unassigned,
            self_message: false,
        }
    }

    pub fn with_kind(mut self, kind: i16) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload<T: Any + Send>(mut self, payload: T) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    pub(crate) fn with_boxed_payload(mut self, payload: Option<Box<dyn Any + Send>>) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn kind(&self) -> i16 {
        self.kind
    }

    pub fn set_kind(&mut self, kind: i16) {
        self.kind = kind;
    }

    pub fn priority(&self) -> i16 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i16) {
        self.priority = priority;
    }

    pub fn timestamp(&self) -> TimeValue {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, t: TimeValue) {
        self.timestamp = t;
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }

    pub fn payload_any(&self) -> Option<&(dyn Any + Send)> {
        self.payload.as_deref()
    }

    pub fn set_payload<T: Any + Send>(&mut self, payload: T) {
        self.payload = Some(Box::new(payload));
    }

    /// Take the payload out if it has type `T`
    pub fn take_payload<T: Any>(&mut self) -> Option<T> {
        match self.payload.take() {
            Some(p) => match p.downcast::<T>() {
                Ok(v) => Some(*v),
                Err(p) => {
                    self.payload = Some(p);
                    None
                }
            },
            None => None,
        }
    }

    /// Id of the event this message was last scheduled as
    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn sender(&self) -> Option<ComponentId> {
        self.sender
    }

    pub fn arrival_component(&self) -> Option<ComponentId> {
        self.arrival_component
    }

    /// Index of the arrival gate in the receiving component's gate table
    pub fn arrival_gate(&self) -> Option<usize> {
        self.arrival_gate
    }

    pub fn sender_gate(&self) -> Option<usize> {
        self.sender_gate
    }

    pub fn sending_time(&self) -> TimeValue {
        self.sending_time
    }

    pub fn arrival_time(&self) -> TimeValue {
        self.arrival_time
    }

    pub fn is_self_message(&self) -> bool {
        self.self_message
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("event_id", &self.event_id)
            .field("sender", &self.sender)
            .field("arrival_component", &self.arrival_component)
            .field("arrival_time", &self.arrival_time)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// What happens when an event is executed
#[derive(Debug)]
pub enum EventKind {
    /// Deliver a message to its arrival component
    Message(Box<Message>),
    /// Terminate the run with the time-limit reason
    EndSimulation,
    /// Start the execution context of an activity component
    ActivityStart(ComponentId),
}

/// An entry of the future event set
#[derive(Debug)]
pub struct Event {
    pub(crate) id: EventId,
    pub(crate) arrival: TimeValue,
    pub(crate) priority: i16,
    pub(crate) insert_seq: u64,
    pub(crate) kind: EventKind,
}

impl Event {
    /// Create an event delivering `msg` at its arrival time
    pub fn message(id: EventId, mut msg: Message) -> Self {
        msg.event_id = Some(id);
        Self {
            id,
            arrival: msg.arrival_time,
            priority: msg.priority,
            insert_seq: 0,
            kind: EventKind::Message(Box::new(msg)),
        }
    }

    pub fn end_simulation(id: EventId, at: TimeValue) -> Self {
        Self {
            id,
            arrival: at,
            priority: END_SIMULATION_PRIORITY,
            insert_seq: 0,
            kind: EventKind::EndSimulation,
        }
    }

    pub fn activity_start(id: EventId, component: ComponentId, at: TimeValue) -> Self {
        Self {
            id,
            arrival: at,
            priority: 0,
            insert_seq: 0,
            kind: EventKind::ActivityStart(component),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn arrival_time(&self) -> TimeValue {
        self.arrival
    }

    pub fn priority(&self) -> i16 {
        self.priority
    }

    /// Insertion sequence number assigned by the future event set
    pub fn insert_seq(&self) -> u64 {
        self.insert_seq
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            EventKind::Message(m) => m.name(),
            EventKind::EndSimulation => "endSimulation",
            EventKind::ActivityStart(_) => "starter",
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match &self.kind {
            EventKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<Message> {
        match self.kind {
            EventKind::Message(m) => Some(*m),
            _ => None,
        }
    }

    /// Component the event is executed in, if any
    pub fn target_component(&self) -> Option<ComponentId> {
        match &self.kind {
            EventKind::Message(m) => m.arrival_component,
            EventKind::ActivityStart(c) => Some(*c),
            EventKind::EndSimulation => None,
        }
    }

    /// Total order: arrival time, then priority (lower first), then insertion order
    pub fn sort_key(&self) -> (TimeValue, i16, u64) {
        (self.arrival, self.priority, self.insert_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_take_keeps_mismatched_type() {
        let mut msg = Message::new("pkt").with_payload(42u32);
        assert_eq!(msg.payload::<u32>(), Some(&42));
        assert_eq!(msg.take_payload::<String>(), None);
        assert!(msg.has_payload());
        assert_eq!(msg.take_payload::<u32>(), Some(42));
        assert!(!msg.has_payload());
    }

    #[test]
    fn test_message_event_takes_time_and_priority() {
        let mut msg = Message::new("m").with_priority(-3);
        msg.arrival_time = TimeValue::from_secs(5);
        msg.arrival_component = Some(ComponentId::new(2));
        let ev = Event::message(EventId::new(7), msg);
        assert_eq!(ev.arrival_time(), TimeValue::from_secs(5));
        assert_eq!(ev.priority(), -3);
        assert_eq!(ev.target_component(), Some(ComponentId::new(2)));
        assert_eq!(ev.as_message().and_then(|m| m.event_id()), Some(EventId::new(7)));
    }

    #[test]
    fn test_end_event_sorts_last_at_equal_time() {
        let t = TimeValue::from_secs(1);
        let end = Event::end_simulation(EventId::new(1), t);
        let mut msg = Message::new("m").with_priority(i16::MAX - 1);
        msg.arrival_time = t;
        let ev = Event::message(EventId::new(2), msg);
        assert!(ev.sort_key() < end.sort_key());
        assert_eq!(end.name(), "endSimulation");
    }
}
