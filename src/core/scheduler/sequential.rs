use super::{Scheduler, SchedulerContext};
use crate::core::errors::SimResult;
use crate::core::event::Event;

/// Executes events back to back in future event set order
#[derive(Debug, Default)]
pub struct SequentialScheduler;

impl SequentialScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for SequentialScheduler {
    fn name(&self) -> &str {
        "sequential"
    }

    fn take_next_event(&mut self, ctx: &mut SchedulerContext<'_>) -> SimResult<Option<Event>> {
        Ok(ctx.fes.extract_first())
    }
}
