use super::{Scheduler, SchedulerContext};
use crate::core::components::ownership::Owner;
use crate::core::errors::SimResult;
use crate::core::event::{Event, Message};
use crate::core::types::ComponentId;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;
use std::time::Duration;

/// A message injected into a running simulation from the outside world
#[derive(Debug)]
pub struct ExternalEvent {
    pub target: ComponentId,
    pub msg: Message,
}

/// Merges externally injected messages into the event stream.
///
/// Injected messages arrive at the current simulation time. When the
/// future event set runs dry the scheduler waits up to `idle_timeout` for
/// outside input before declaring the run out of events.
pub struct ExternalScheduler {
    inbox: Receiver<ExternalEvent>,
    idle_timeout: Duration,
}

impl ExternalScheduler {
    /// Create a scheduler together with the sender used to feed it
    pub fn channel(idle_timeout: Duration) -> (Sender<ExternalEvent>, Self) {
        let (tx, rx) = unbounded();
        (
            tx,
            Self {
                inbox: rx,
                idle_timeout,
            },
        )
    }

    fn enqueue(ctx: &mut SchedulerContext<'_>, ext: ExternalEvent) -> SimResult {
        let mut msg = ext.msg;
        msg.arrival_component = Some(ext.target);
        msg.arrival_gate = None;
        msg.sending_time = ctx.now;
        msg.arrival_time = ctx.now;
        msg.owner = Owner::FutureEvents;
        let id = ctx.ids.next_event_id()?;
        debug!("external: '{}' injected for {} at t={}", msg.name(), ext.target, ctx.now);
        ctx.fes.insert(Event::message(id, msg));
        Ok(())
    }
}

impl Scheduler for ExternalScheduler {
    fn name(&self) -> &str {
        "external"
    }

    fn take_next_event(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult<Option<Event>> {
        while let Ok(ext) = self.inbox.try_recv() {
            Self::enqueue(ctx, ext)?;
        }
        if ctx.fes.is_empty() {
            match self.inbox.recv_timeout(self.idle_timeout) {
                Ok(ext) => Self::enqueue(ctx, ext)?,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(None)
                }
            }
        }
        Ok(ctx.fes.extract_first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fes::FesKind;
    use crate::core::time::TimeValue;
    use crate::core::types::UniqueNumbers;

    #[test]
    fn test_injected_message_arrives_now() {
        let (tx, mut sched) = ExternalScheduler::channel(Duration::from_millis(10));
        let mut fes = FesKind::Heap.create();
        let mut ids = UniqueNumbers::new();
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: None,
            now: TimeValue::from_secs(3),
        };
        tx.send(ExternalEvent {
            target: ComponentId::new(2),
            msg: Message::new("key"),
        })
        .unwrap();
        let ev = sched.take_next_event(&mut ctx).unwrap().unwrap();
        assert_eq!(ev.arrival_time(), TimeValue::from_secs(3));
        assert_eq!(ev.target_component(), Some(ComponentId::new(2)));
        // nothing more comes in before the idle timeout
        assert!(sched.take_next_event(&mut ctx).unwrap().is_none());
    }
}
