use crate::core::components::ownership::Owner;
use crate::core::errors::{SimError, Termination, TerminationReason};
use crate::core::event::Message;
use crate::core::execution::config::ParsimConfig;
use crate::core::parsim::comm_buffer::CommBuffer;
use crate::core::parsim::communications::{Communications, Received};
use crate::core::pattern::PathPattern;
use crate::core::time::TimeValue;
use crate::core::types::ComponentId;
use log::{debug, warn};
use std::any::Any;
use std::time::Duration;

pub const TAG_CMESSAGE: u8 = 1;
pub const TAG_NULL_MESSAGE: u8 = 2;
pub const TAG_TERMINATE: u8 = 3;
pub const TAG_ERROR: u8 = 4;

const NO_GATE: u32 = u32::MAX;

/// Serializes message payloads for the trip to another partition
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: Option<&(dyn Any + Send)>, buf: &mut CommBuffer) -> Result<(), SimError>;

    fn decode(&self, buf: &mut CommBuffer) -> Result<Option<Box<dyn Any + Send>>, SimError>;
}

/// Codec for payloads of the common scalar types, strings and byte vectors
#[derive(Debug, Default)]
pub struct BasicPayloadCodec;

impl PayloadCodec for BasicPayloadCodec {
    fn encode(&self, payload: Option<&(dyn Any + Send)>, buf: &mut CommBuffer) -> Result<(), SimError> {
        let p = match payload {
            None => {
                buf.pack(&0u8)?;
                return Ok(());
            }
            Some(p) => p,
        };
        if let Some(s) = p.downcast_ref::<String>() {
            buf.pack(&1u8)?;
            buf.pack(s)?;
        } else if let Some(v) = p.downcast_ref::<i64>() {
            buf.pack(&2u8)?;
            buf.pack(v)?;
        } else if let Some(v) = p.downcast_ref::<f64>() {
            buf.pack(&3u8)?;
            buf.pack(v)?;
        } else if let Some(v) = p.downcast_ref::<Vec<u8>>() {
            buf.pack(&4u8)?;
            buf.pack_bytes(v)?;
        } else if let Some(v) = p.downcast_ref::<u64>() {
            buf.pack(&5u8)?;
            buf.pack(v)?;
        } else if let Some(v) = p.downcast_ref::<bool>() {
            buf.pack(&6u8)?;
            buf.pack(v)?;
        } else {
            return Err(SimError::Comm(
                "message payload type cannot be sent to another partition".to_string(),
            ));
        }
        Ok(())
    }

    fn decode(&self, buf: &mut CommBuffer) -> Result<Option<Box<dyn Any + Send>>, SimError> {
        Ok(match buf.unpack::<u8>()? {
            0 => None,
            1 => Some(Box::new(buf.unpack::<String>()?)),
            2 => Some(Box::new(buf.unpack::<i64>()?)),
            3 => Some(Box::new(buf.unpack::<f64>()?)),
            4 => Some(Box::new(buf.unpack_bytes()?)),
            5 => Some(Box::new(buf.unpack::<u64>()?)),
            6 => Some(Box::new(buf.unpack::<bool>()?)),
            other => return Err(SimError::Comm(format!("unknown payload tag {}", other))),
        })
    }
}

/// What a peer partition sent us
#[derive(Debug)]
pub enum Incoming {
    Message(Message),
    /// The peer promises to send nothing earlier than `eot` from now on
    Null { source: u32, eot: TimeValue },
    Terminate { source: u32, termination: Termination },
    Error { source: u32, error: SimError },
}

/// Where a module lives in a distributed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Local,
    Remote(u32),
}

/// This kernel's share of a distributed run: placement of modules, and
/// the packing of everything that crosses a partition boundary.
///
/// Every partition builds the same component tree in the same order,
/// placeholders included, so a component id names the same module in all
/// partitions and is used as the remote address.
pub struct Partition {
    config: ParsimConfig,
    comm: Box<dyn Communications>,
    codec: Box<dyn PayloadCodec>,
    patterns: Vec<(PathPattern, u32)>,
    sent: u64,
    received: u64,
}

impl Partition {
    pub fn new(config: ParsimConfig, comm: Box<dyn Communications>) -> Result<Self, SimError> {
        config.validate()?;
        if comm.partition_id() != config.partition_id || comm.num_partitions() != config.num_partitions {
            return Err(SimError::Config(format!(
                "transport is partition {} of {}, configuration says {} of {}",
                comm.partition_id(),
                comm.num_partitions(),
                config.partition_id,
                config.num_partitions
            )));
        }
        let patterns = config
            .partition_map
            .iter()
            .map(|a| (PathPattern::new(&a.pattern), a.partition))
            .collect();
        Ok(Self {
            config,
            comm,
            codec: Box::new(BasicPayloadCodec),
            patterns,
            sent: 0,
            received: 0,
        })
    }

    pub fn with_codec(mut self, codec: Box<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn id(&self) -> u32 {
        self.config.partition_id
    }

    pub fn num_partitions(&self) -> u32 {
        self.config.num_partitions
    }

    pub fn lookahead(&self) -> TimeValue {
        self.config.lookahead
    }

    /// Messages sent to and received from other partitions so far
    pub fn stats(&self) -> (u64, u64) {
        (self.sent, self.received)
    }

    /// Partition a module path is assigned to; first matching rule wins
    pub fn partition_of(&self, path: &str) -> Option<u32> {
        self.patterns
            .iter()
            .find(|(p, _)| p.matches(path))
            .map(|(_, part)| *part)
    }

    /// Compound modules without an assignment exist in every partition;
    /// other unassigned modules belong to partition 0.
    pub fn placement(&self, path: &str, compound: bool) -> Placement {
        match self.partition_of(path) {
            Some(p) if p == self.id() => Placement::Local,
            Some(p) => Placement::Remote(p),
            None if compound || self.id() == 0 => Placement::Local,
            None => Placement::Remote(0),
        }
    }

    /// Ship `msg` to the partition hosting its arrival component
    pub fn send_remote(&mut self, msg: &Message, dest: u32, now: TimeValue) -> Result<(), SimError> {
        let earliest = now.saturating_add(self.lookahead());
        if msg.arrival_time() < earliest {
            return Err(SimError::Comm(format!(
                "message '{}' would arrive at t={} in partition {}, before the lookahead allows (t={})",
                msg.name(),
                msg.arrival_time(),
                dest,
                earliest
            )));
        }
        let target = msg.arrival_component().ok_or_else(|| {
            SimError::internal(format!("remote message '{}' has no destination", msg.name()))
        })?;
        let mut buf = CommBuffer::new();
        buf.pack_str(msg.name())?;
        buf.pack(&msg.kind())?;
        buf.pack(&msg.priority())?;
        buf.pack(&msg.timestamp())?;
        buf.pack(&msg.sending_time())?;
        buf.pack(&msg.arrival_time())?;
        buf.pack(&msg.sender().map_or(0, ComponentId::raw))?;
        buf.pack(&target.raw())?;
        buf.pack(&msg.arrival_gate().map_or(NO_GATE, |g| g as u32))?;
        self.codec.encode(msg.payload_any(), &mut buf)?;
        self.comm.send(&buf, TAG_CMESSAGE, dest)?;
        self.sent += 1;
        Ok(())
    }

    fn unpack_message(&self, buf: &mut CommBuffer) -> Result<Message, SimError> {
        let name: String = buf.unpack()?;
        let kind: i16 = buf.unpack()?;
        let priority: i16 = buf.unpack()?;
        let timestamp: TimeValue = buf.unpack()?;
        let sending_time: TimeValue = buf.unpack()?;
        let arrival_time: TimeValue = buf.unpack()?;
        let sender: u32 = buf.unpack()?;
        let target: u32 = buf.unpack()?;
        let gate: u32 = buf.unpack()?;
        let payload = self.codec.decode(buf)?;
        let mut msg = Message::new(name)
            .with_kind(kind)
            .with_priority(priority)
            .with_boxed_payload(payload);
        msg.set_timestamp(timestamp);
        msg.sending_time = sending_time;
        msg.arrival_time = arrival_time;
        msg.sender = (sender != 0).then(|| ComponentId::new(sender));
        msg.arrival_component = Some(ComponentId::new(target));
        msg.arrival_gate = (gate != NO_GATE).then_some(gate as usize);
        msg.owner = Owner::FutureEvents;
        Ok(msg)
    }

    pub fn send_null(&mut self, dest: u32, eot: TimeValue) -> Result<(), SimError> {
        let mut buf = CommBuffer::new();
        buf.pack(&eot)?;
        self.comm.send(&buf, TAG_NULL_MESSAGE, dest)
    }

    pub fn broadcast_termination(&mut self, termination: &Termination) -> Result<(), SimError> {
        let mut buf = CommBuffer::new();
        buf.pack(&termination.reason.code())?;
        buf.pack(&termination.message)?;
        self.comm.broadcast(&buf, TAG_TERMINATE)
    }

    pub fn broadcast_error(&mut self, error: &SimError) -> Result<(), SimError> {
        let mut buf = CommBuffer::new();
        buf.pack(&error.to_string())?;
        self.comm.broadcast(&buf, TAG_ERROR)
    }

    /// Next buffer from a peer, decoded; waits up to `wait` if given
    pub fn receive(&mut self, wait: Option<Duration>) -> Result<Option<Incoming>, SimError> {
        let received = match wait {
            Some(timeout) => self.comm.receive_blocking(timeout)?,
            None => self.comm.receive_nonblocking()?,
        };
        received.map(|r| self.decode(r)).transpose()
    }

    fn decode(&mut self, received: Received) -> Result<Incoming, SimError> {
        let Received {
            mut buffer,
            tag,
            source,
        } = received;
        let incoming = match tag {
            TAG_CMESSAGE => {
                self.received += 1;
                Incoming::Message(self.unpack_message(&mut buffer)?)
            }
            TAG_NULL_MESSAGE => Incoming::Null {
                source,
                eot: buffer.unpack()?,
            },
            TAG_TERMINATE => {
                let code: u8 = buffer.unpack()?;
                let text: String = buffer.unpack()?;
                debug!(
                    "partition {} terminated ({:?}): {}",
                    source,
                    TerminationReason::from_code(code),
                    text
                );
                Incoming::Terminate {
                    source,
                    termination: Termination::new(
                        TerminationReason::RemoteTermination,
                        format!("partition {} terminated: {}", source, text),
                    ),
                }
            }
            TAG_ERROR => Incoming::Error {
                source,
                error: SimError::Remote {
                    partition: source,
                    message: buffer.unpack()?,
                },
            },
            other => {
                return Err(SimError::Comm(format!(
                    "unknown tag {} from partition {}",
                    other, source
                )))
            }
        };
        if !buffer.is_fully_read() {
            warn!(
                "{} trailing bytes in buffer (tag {}) from partition {}",
                buffer.remaining(),
                tag,
                source
            );
        }
        Ok(incoming)
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id())
            .field("num_partitions", &self.num_partitions())
            .field("lookahead", &self.lookahead())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parsim::communications::ChannelCommunications;

    fn pair() -> (Partition, Partition) {
        let mut group = ChannelCommunications::create_group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        let cfg = |id| {
            ParsimConfig::new(id, 2, TimeValue::from_millis(5))
                .assign("net.left", 0)
                .assign("net.right", 1)
        };
        (
            Partition::new(cfg(0), Box::new(a)).unwrap(),
            Partition::new(cfg(1), Box::new(b)).unwrap(),
        )
    }

    #[test]
    fn test_placement() {
        let (a, b) = pair();
        assert_eq!(a.placement("net.left", false), Placement::Local);
        assert_eq!(a.placement("net.right", false), Placement::Remote(1));
        assert_eq!(b.placement("net", true), Placement::Local);
        assert_eq!(b.placement("net.other", false), Placement::Remote(0));
    }

    #[test]
    fn test_message_crosses_with_fields_intact() {
        let (mut a, mut b) = pair();
        let mut msg = Message::new("job").with_kind(3).with_payload("data".to_string());
        msg.arrival_time = TimeValue::from_millis(20);
        msg.sending_time = TimeValue::from_millis(10);
        msg.arrival_component = Some(ComponentId::new(4));
        msg.arrival_gate = Some(1);
        msg.sender = Some(ComponentId::new(2));
        a.send_remote(&msg, 1, TimeValue::from_millis(10)).unwrap();
        match b.receive(Some(Duration::from_millis(100))).unwrap() {
            Some(Incoming::Message(m)) => {
                assert_eq!(m.name(), "job");
                assert_eq!(m.kind(), 3);
                assert_eq!(m.payload::<String>().map(String::as_str), Some("data"));
                assert_eq!(m.arrival_time(), TimeValue::from_millis(20));
                assert_eq!(m.arrival_component(), Some(ComponentId::new(4)));
                assert_eq!(m.arrival_gate(), Some(1));
                assert_eq!(m.sender(), Some(ComponentId::new(2)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(a.stats(), (1, 0));
        assert_eq!(b.stats(), (0, 1));
    }

    #[test]
    fn test_lookahead_violation_is_refused() {
        let (mut a, _b) = pair();
        let mut msg = Message::new("early");
        msg.arrival_time = TimeValue::from_millis(12);
        msg.arrival_component = Some(ComponentId::new(4));
        assert!(a.send_remote(&msg, 1, TimeValue::from_millis(10)).is_err());
    }

    #[test]
    fn test_errors_arrive_as_remote() {
        let (mut a, mut b) = pair();
        a.broadcast_error(&SimError::runtime("boom")).unwrap();
        match b.receive(Some(Duration::from_millis(100))).unwrap() {
            Some(Incoming::Error { source, error }) => {
                assert_eq!(source, 0);
                assert!(error.is_remote());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
