//! Conservative synchronization with null messages.
//!
//! Every partition tells each peer the earliest time at which it could
//! still send it anything (its earliest output time, EOT). A peer's last
//! announced EOT is our earliest input time (EIT) from it. A local event at
//! `t` is safe to execute once `t` is strictly below the EIT of every peer:
//! nothing with a timestamp of `t` or earlier can arrive any more.
//!
//! Our own EOT is `min(next local event, min EIT) + lookahead`: no event we
//! execute can be earlier than that minimum, and every message crossing a
//! partition boundary takes at least the lookahead.

use crate::core::components::ownership::Owner;
use crate::core::errors::{Interrupt, SimError, SimResult};
use crate::core::event::Event;
use crate::core::fes::FutureEventSet;
use crate::core::parsim::partition::{Incoming, Partition};
use crate::core::scheduler::{Scheduler, SchedulerContext};
use crate::core::time::TimeValue;
use crate::core::types::UniqueNumbers;
use log::{debug, trace};
use std::time::Duration;

pub struct NullMessageScheduler {
    me: u32,
    lookahead: TimeValue,
    eit: Vec<TimeValue>,
    last_eot: TimeValue,
    poll: Duration,
}

impl NullMessageScheduler {
    pub fn new(partition_id: u32, num_partitions: u32, lookahead: TimeValue) -> Self {
        let mut eit = vec![lookahead; num_partitions as usize];
        if let Some(own) = eit.get_mut(partition_id as usize) {
            *own = TimeValue::MAX;
        }
        Self {
            me: partition_id,
            lookahead,
            eit,
            last_eot: TimeValue::ZERO,
            poll: Duration::from_millis(50),
        }
    }

    /// How long to wait for peer input before re-checking
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Earliest time anything can still arrive from any peer
    pub fn earliest_input_time(&self) -> TimeValue {
        self.eit.iter().copied().min().unwrap_or(TimeValue::MAX)
    }

    fn peers(&self) -> impl Iterator<Item = u32> + '_ {
        let me = self.me;
        (0..self.eit.len() as u32).filter(move |&p| p != me)
    }

    fn handle(
        &mut self,
        fes: &mut dyn FutureEventSet,
        ids: &mut UniqueNumbers,
        now: TimeValue,
        incoming: Incoming,
    ) -> SimResult {
        match incoming {
            Incoming::Message(mut msg) => {
                if msg.arrival_time() < now {
                    return Err(SimError::Comm(format!(
                        "causality violation: message '{}' for t={} arrived at t={}",
                        msg.name(),
                        msg.arrival_time(),
                        now
                    ))
                    .into());
                }
                msg.owner = Owner::FutureEvents;
                trace!("remote message '{}' due at t={}", msg.name(), msg.arrival_time());
                fes.insert(Event::message(ids.next_event_id()?, msg));
                Ok(())
            }
            Incoming::Null { source, eot } => {
                if let Some(slot) = self.eit.get_mut(source as usize) {
                    if eot > *slot {
                        *slot = eot;
                    }
                }
                Ok(())
            }
            Incoming::Terminate { termination, .. } => Err(Interrupt::Terminated(termination)),
            Incoming::Error { error, .. } => Err(Interrupt::Failed(error)),
        }
    }

    fn announce(&mut self, partition: &mut Partition, next_local: Option<TimeValue>, now: TimeValue) -> SimResult {
        let base = next_local
            .unwrap_or(TimeValue::MAX)
            .min(self.earliest_input_time())
            .max(now);
        let eot = base.saturating_add(self.lookahead);
        if eot <= self.last_eot {
            return Ok(());
        }
        self.last_eot = eot;
        let peers: Vec<u32> = self.peers().filter(|&p| self.eit[p as usize] < TimeValue::MAX).collect();
        for p in peers {
            partition.send_null(p, eot)?;
        }
        Ok(())
    }
}

impl Scheduler for NullMessageScheduler {
    fn name(&self) -> &str {
        "null-message"
    }

    fn start_run(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult {
        let me = self.me as usize;
        for (p, slot) in self.eit.iter_mut().enumerate() {
            *slot = if p == me { TimeValue::MAX } else { self.lookahead };
        }
        self.last_eot = TimeValue::ZERO;
        let partition = ctx
            .partition
            .as_deref_mut()
            .ok_or_else(|| SimError::internal("null message scheduler without a partition"))?;
        let next = ctx.fes.peek_first().map(Event::arrival_time);
        self.announce(partition, next, ctx.now)
    }

    /// Tell every peer we will send nothing more
    fn end_run(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult {
        if let Some(partition) = ctx.partition.as_deref_mut() {
            let peers: Vec<u32> = self.peers().collect();
            for p in peers {
                if let Err(e) = partition.send_null(p, TimeValue::MAX) {
                    debug!("final null message to partition {} failed: {}", p, e);
                }
            }
        }
        self.last_eot = TimeValue::MAX;
        Ok(())
    }

    fn take_next_event(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult<Option<Event>> {
        let partition = ctx
            .partition
            .as_deref_mut()
            .ok_or_else(|| SimError::internal("null message scheduler without a partition"))?;
        loop {
            while let Some(incoming) = partition.receive(None)? {
                self.handle(&mut *ctx.fes, &mut *ctx.ids, ctx.now, incoming)?;
            }
            let next = ctx.fes.peek_first().map(Event::arrival_time);
            self.announce(partition, next, ctx.now)?;
            let eit = self.earliest_input_time();
            match next {
                Some(t) if t < eit => return Ok(ctx.fes.extract_first()),
                None if eit == TimeValue::MAX => return Ok(None),
                _ => {}
            }
            trace!("partition {} blocked: next local {:?}, eit {}", self.me, next, eit);
            if let Some(incoming) = partition.receive(Some(self.poll))? {
                self.handle(&mut *ctx.fes, &mut *ctx.ids, ctx.now, incoming)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Message;
    use crate::core::execution::config::ParsimConfig;
    use crate::core::fes::FesKind;
    use crate::core::parsim::communications::ChannelCommunications;
    use crate::core::types::{ComponentId, EventId};

    fn partitions() -> (Partition, Partition) {
        let mut group = ChannelCommunications::create_group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        let la = TimeValue::from_secs(1);
        (
            Partition::new(ParsimConfig::new(0, 2, la), Box::new(a)).unwrap(),
            Partition::new(ParsimConfig::new(1, 2, la), Box::new(b)).unwrap(),
        )
    }

    fn local_event(id: u64, t: i64) -> Event {
        let mut msg = Message::new("local");
        msg.arrival_time = TimeValue::from_secs(t);
        msg.arrival_component = Some(ComponentId::new(1));
        Event::message(EventId::new(id), msg)
    }

    #[test]
    fn test_event_below_initial_eit_is_safe() {
        let (mut a, _b) = partitions();
        let mut fes = FesKind::Heap.create();
        let mut ids = UniqueNumbers::new();
        fes.insert(local_event(1, 0));
        let mut sched = NullMessageScheduler::new(0, 2, TimeValue::from_secs(1));
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: Some(&mut a),
            now: TimeValue::ZERO,
        };
        sched.start_run(&mut ctx).unwrap();
        // t=0 < lookahead, the initial promise of every peer
        assert!(sched.take_next_event(&mut ctx).unwrap().is_some());
    }

    #[test]
    fn test_null_message_unblocks_and_final_null_ends() {
        let (mut a, mut b) = partitions();
        let mut fes = FesKind::Heap.create();
        let mut ids = UniqueNumbers::new();
        fes.insert(local_event(1, 5));
        let mut sched = NullMessageScheduler::new(0, 2, TimeValue::from_secs(1))
            .with_poll_interval(Duration::from_millis(5));
        // peer promises nothing before t=6, then says it is done
        b.send_null(0, TimeValue::from_secs(6)).unwrap();
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: Some(&mut a),
            now: TimeValue::ZERO,
        };
        let ev = sched.take_next_event(&mut ctx).unwrap().unwrap();
        assert_eq!(ev.arrival_time(), TimeValue::from_secs(5));
        assert_eq!(sched.earliest_input_time(), TimeValue::from_secs(6));
        b.send_null(0, TimeValue::MAX).unwrap();
        assert!(sched.take_next_event(&mut ctx).unwrap().is_none());
    }

    #[test]
    fn test_remote_error_surfaces_as_failure() {
        let (mut a, mut b) = partitions();
        let mut fes = FesKind::Heap.create();
        let mut ids = UniqueNumbers::new();
        b.broadcast_error(&SimError::runtime("peer broke")).unwrap();
        let mut sched = NullMessageScheduler::new(0, 2, TimeValue::from_secs(1));
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: Some(&mut a),
            now: TimeValue::ZERO,
        };
        match sched.take_next_event(&mut ctx) {
            Err(Interrupt::Failed(e)) => assert!(e.is_remote()),
            other => panic!("unexpected {:?}", other.map(|e| e.map(|ev| ev.id()))),
        }
    }
}
