//! Event schedulers.
//!
//! A scheduler decides which event the kernel executes next. The
//! sequential one simply takes the head of the future event set; the others
//! pace it against the wall clock, merge in events from outside the
//! simulation, or hold local progress back until peer partitions allow it.

pub mod external;
pub mod realtime;
pub mod sequential;

pub use external::{ExternalEvent, ExternalScheduler};
pub use realtime::RealTimeScheduler;
pub use sequential::SequentialScheduler;

use crate::core::errors::SimResult;
use crate::core::event::Event;
use crate::core::fes::FutureEventSet;
use crate::core::parsim::partition::Partition;
use crate::core::time::TimeValue;
use crate::core::types::UniqueNumbers;

/// Kernel state a scheduler may touch while picking an event
pub struct SchedulerContext<'a> {
    pub fes: &'a mut (dyn FutureEventSet + 'static),
    /// Source of ids for events entering from outside the future event set
    pub ids: &'a mut UniqueNumbers,
    pub partition: Option<&'a mut Partition>,
    pub now: TimeValue,
}

pub trait Scheduler: Send {
    fn name(&self) -> &str;

    /// Called once before the first event of a run
    fn start_run(&mut self, _ctx: &mut SchedulerContext<'_>) -> SimResult {
        Ok(())
    }

    /// Called once after the last event of a run, however it ended
    fn end_run(&mut self, _ctx: &mut SchedulerContext<'_>) -> SimResult {
        Ok(())
    }

    /// Remove and return the next event to execute; `None` if there is
    /// nothing left and nothing can arrive any more
    fn take_next_event(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult<Option<Event>>;

    /// Reinsert an event taken but not executed
    fn put_back_event(&mut self, ctx: &mut SchedulerContext<'_>, event: Event) {
        ctx.fes.put_back(event);
    }

    /// Best guess of the next event, without changing any state
    fn guess_next_event<'f>(&self, fes: &'f dyn FutureEventSet) -> Option<&'f Event> {
        fes.peek_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Message;
    use crate::core::fes::FesKind;
    use crate::core::types::EventId;

    fn event_at(id: u64, t: i64) -> Event {
        let mut msg = Message::new("m");
        msg.arrival_time = TimeValue::from_secs(t);
        Event::message(EventId::new(id), msg)
    }

    #[test]
    fn test_sequential_delegates_to_fes() {
        let mut fes = FesKind::Heap.create();
        let mut ids = UniqueNumbers::new();
        fes.insert(event_at(1, 5));
        fes.insert(event_at(2, 3));
        let mut sched = SequentialScheduler::new();
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: None,
            now: TimeValue::ZERO,
        };
        assert_eq!(sched.guess_next_event(&*ctx.fes).map(|e| e.id().raw()), Some(2));
        let first = sched.take_next_event(&mut ctx).unwrap().unwrap();
        assert_eq!(first.id().raw(), 2);
        sched.put_back_event(&mut ctx, first);
        assert_eq!(ctx.fes.len(), 2);
        let again = sched.take_next_event(&mut ctx).unwrap().unwrap();
        assert_eq!(again.id().raw(), 2);
        sched.take_next_event(&mut ctx).unwrap();
        assert!(sched.take_next_event(&mut ctx).unwrap().is_none());
    }
}
