use super::{Scheduler, SchedulerContext};
use crate::core::errors::{SimError, SimResult};
use crate::core::event::Event;
use crate::core::time::TimeValue;
use log::debug;
use std::thread;
use std::time::{Duration, Instant};

/// Paces event execution against the wall clock.
///
/// An event at simulation time `t` is not handed out before
/// `(t - t0) / speed` seconds of real time have passed since the run
/// started at `t0`. A run that falls behind is not slowed down further.
#[derive(Debug)]
pub struct RealTimeScheduler {
    speed: f64,
    base: Option<(Instant, TimeValue)>,
}

impl RealTimeScheduler {
    pub fn new(speed: f64) -> Self {
        Self { speed, base: None }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Wall-clock instant at which an event at `t` becomes due. A wait too
    /// long for the clock to express is an error.
    fn due(&self, t: TimeValue) -> Result<Option<Instant>, SimError> {
        let Some((start, t0)) = self.base else {
            return Ok(None);
        };
        let secs = (t - t0).as_secs_f64() / self.speed;
        if secs <= 0.0 {
            return Ok(Some(start));
        }
        Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|wait| start.checked_add(wait))
            .map(Some)
            .ok_or_else(|| {
                SimError::Config(format!(
                    "event at t={} cannot be paced at real-time speed {}",
                    t, self.speed
                ))
            })
    }
}

impl Scheduler for RealTimeScheduler {
    fn name(&self) -> &str {
        "realtime"
    }

    fn start_run(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult {
        self.base = Some((Instant::now(), ctx.now));
        Ok(())
    }

    fn end_run(&mut self, _ctx: &mut SchedulerContext<'_>) -> SimResult {
        self.base = None;
        Ok(())
    }

    fn take_next_event(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult<Option<Event>> {
        if self.base.is_none() {
            self.base = Some((Instant::now(), ctx.now));
        }
        let next = match ctx.fes.peek_first() {
            Some(ev) => ev.arrival_time(),
            None => return Ok(None),
        };
        if let Some(due) = self.due(next)? {
            let now = Instant::now();
            if due > now {
                debug!("realtime: sleeping {:?} until t={}", due - now, next);
                thread::sleep(due - now);
            }
        }
        Ok(ctx.fes.extract_first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Message;
    use crate::core::fes::FesKind;
    use crate::core::types::{EventId, UniqueNumbers};

    #[test]
    fn test_events_are_paced() {
        let mut fes = FesKind::Heap.create();
        let mut msg = Message::new("m");
        msg.arrival_time = TimeValue::from_millis(40);
        fes.insert(Event::message(EventId::new(1), msg));
        let mut ids = UniqueNumbers::new();
        let mut ctx = SchedulerContext {
            fes: fes.as_mut(),
            ids: &mut ids,
            partition: None,
            now: TimeValue::ZERO,
        };
        // twice as fast as real time: 40ms of simulation take about 20ms
        let mut sched = RealTimeScheduler::new(2.0);
        let started = Instant::now();
        sched.start_run(&mut ctx).unwrap();
        assert!(sched.take_next_event(&mut ctx).unwrap().is_some());
        assert!(started.elapsed() >= Duration::from_millis(19));
    }

    #[test]
    fn test_unreachable_due_time_fails_instead_of_panicking() {
        let mut sched = RealTimeScheduler::new(1e-300);
        sched.base = Some((Instant::now(), TimeValue::ZERO));
        assert!(matches!(sched.due(TimeValue::from_secs(1)), Err(SimError::Config(_))));
        assert_eq!(sched.due(TimeValue::ZERO).unwrap(), sched.base.map(|(start, _)| start));
        assert!(RealTimeScheduler::new(1.0).due(TimeValue::from_secs(1)).unwrap().is_none());
    }
}
