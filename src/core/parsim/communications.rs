use crate::core::errors::SimError;
use crate::core::parsim::comm_buffer::CommBuffer;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::trace;
use std::time::Duration;

/// A buffer received from a peer partition
#[derive(Debug, Clone)]
pub struct Received {
    pub buffer: CommBuffer,
    pub tag: u8,
    pub source: u32,
}

/// Byte transport between the partitions of a distributed run
pub trait Communications: Send {
    fn num_partitions(&self) -> u32;

    fn partition_id(&self) -> u32;

    fn send(&mut self, buffer: &CommBuffer, tag: u8, dest: u32) -> Result<(), SimError>;

    /// Send to every other partition
    fn broadcast(&mut self, buffer: &CommBuffer, tag: u8) -> Result<(), SimError> {
        let me = self.partition_id();
        for dest in (0..self.num_partitions()).filter(|&p| p != me) {
            self.send(buffer, tag, dest)?;
        }
        Ok(())
    }

    /// Wait for the next buffer; `None` if `timeout` passes first
    fn receive_blocking(&mut self, timeout: Duration) -> Result<Option<Received>, SimError>;

    fn receive_nonblocking(&mut self) -> Result<Option<Received>, SimError>;
}

struct Packet {
    source: u32,
    tag: u8,
    bytes: Vec<u8>,
}

/// In-process transport connecting partitions that run on separate threads
pub struct ChannelCommunications {
    id: u32,
    peers: Vec<Option<Sender<Packet>>>,
    inbox: Receiver<Packet>,
}

impl ChannelCommunications {
    /// Create `n` fully connected endpoints, one per partition
    pub fn create_group(n: u32) -> Vec<ChannelCommunications> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| unbounded::<Packet>()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(i, inbox)| ChannelCommunications {
                id: i as u32,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(j, tx)| if i == j { None } else { Some(tx.clone()) })
                    .collect(),
                inbox,
            })
            .collect()
    }

    fn wrap(packet: Packet) -> Received {
        Received {
            buffer: CommBuffer::from_bytes(packet.bytes),
            tag: packet.tag,
            source: packet.source,
        }
    }
}

impl Communications for ChannelCommunications {
    fn num_partitions(&self) -> u32 {
        self.peers.len() as u32
    }

    fn partition_id(&self) -> u32 {
        self.id
    }

    fn send(&mut self, buffer: &CommBuffer, tag: u8, dest: u32) -> Result<(), SimError> {
        let tx = self
            .peers
            .get(dest as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| SimError::Comm(format!("partition {} cannot send to {}", self.id, dest)))?;
        trace!("partition {} -> {}: tag {} ({} bytes)", self.id, dest, tag, buffer.len());
        tx.send(Packet {
            source: self.id,
            tag,
            bytes: buffer.as_bytes().to_vec(),
        })
        .or_else(|_| {
            // a partition that already finished its run discards its input
            trace!("partition {} is gone, buffer with tag {} dropped", dest, tag);
            Ok(())
        })
    }

    fn receive_blocking(&mut self, timeout: Duration) -> Result<Option<Received>, SimError> {
        match self.inbox.recv_timeout(timeout) {
            Ok(p) => Ok(Some(Self::wrap(p))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SimError::Comm("all peer partitions disconnected".to_string()))
            }
        }
    }

    fn receive_nonblocking(&mut self) -> Result<Option<Received>, SimError> {
        match self.inbox.try_recv() {
            Ok(p) => Ok(Some(Self::wrap(p))),
            // peers that finished leave nothing more to read
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_delivers_with_source_and_tag() {
        let mut group = ChannelCommunications::create_group(3);
        let mut buf = CommBuffer::new();
        buf.pack(&42u32).unwrap();
        group[0].broadcast(&buf, 7).unwrap();
        for rank in 1..3 {
            let mut got = group[rank]
                .receive_blocking(Duration::from_millis(100))
                .unwrap()
                .unwrap();
            assert_eq!(got.source, 0);
            assert_eq!(got.tag, 7);
            assert_eq!(got.buffer.unpack::<u32>().unwrap(), 42);
        }
        assert!(group[0].receive_nonblocking().unwrap().is_none());
        assert!(group[0].send(&buf, 1, 0).is_err());
    }
}
