//! Driving whole runs: breakpoints, the setup-to-teardown sequence, and
//! running several simulations at once.

use crate::core::errors::{SimError, Termination};
use crate::core::execution::simulation::Simulation;
use crate::core::parsim::communications::ChannelCommunications;
use crate::core::time::TimeValue;
use log::{info, warn};
use rayon::prelude::*;
use std::thread;
use uuid::Uuid;

/// Where `run_until` pauses. Unset fields impose no bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimit {
    /// Pause before the first event later than this time
    pub sim_time: Option<TimeValue>,
    /// Pause once this many events have been executed in total
    pub event_number: Option<u64>,
}

impl RunLimit {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn until_time(t: TimeValue) -> Self {
        Self {
            sim_time: Some(t),
            event_number: None,
        }
    }

    pub fn until_event(n: u64) -> Self {
        Self {
            sim_time: None,
            event_number: Some(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// A breakpoint was reached; the run can be continued
    Paused,
    Terminated(Termination),
}

/// Summary of one complete run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub termination: Option<Termination>,
    pub error: Option<SimError>,
    pub events: u64,
    pub sim_time: TimeValue,
    pub fingerprint: String,
}

impl RunReport {
    /// Whether the run ended with a termination rather than an error
    pub fn is_success(&self) -> bool {
        self.termination.is_some() && self.error.is_none()
    }
}

/// Set up `network`, initialize, run, finish and delete it again.
///
/// Teardown is always attempted, also after a failure; problems during
/// teardown are logged and do not replace the run's outcome.
pub fn run_simulation(sim: &mut Simulation, network: &str) -> RunReport {
    let outcome = sim
        .setup_network(network)
        .and_then(|_| sim.call_initialize())
        .and_then(|_| sim.run());
    let (termination, mut error) = match outcome {
        Ok(t) => (Some(t), None),
        Err(e) => (None, Some(e)),
    };
    if termination.is_some() {
        if let Err(e) = sim.call_finish() {
            error = Some(e);
        }
    }
    let report = RunReport {
        run_id: sim.run_id(),
        termination,
        error,
        events: sim.event_number(),
        sim_time: sim.now(),
        fingerprint: sim.fingerprint(),
    };
    if let Err(e) = sim.delete_network() {
        warn!("run {}: network teardown failed: {}", report.run_id, e);
    }
    report
}

/// Run independent simulations on the rayon pool, returning their
/// reports in job order
pub fn run_parallel<F>(jobs: Vec<F>) -> Vec<RunReport>
where
    F: FnOnce() -> RunReport + Send,
{
    info!("running {} independent simulations", jobs.len());
    jobs.into_par_iter().map(|job| job()).collect()
}

/// Run the partitions of one distributed simulation, one thread each,
/// connected by in-process channels. `make` builds the kernel of a
/// partition from its rank and transport.
///
/// Partitions block on each other, so they get dedicated threads instead
/// of pool workers.
pub fn run_partitions<F>(num_partitions: u32, network: &str, make: F) -> Vec<RunReport>
where
    F: Fn(u32, ChannelCommunications) -> Result<Simulation, SimError> + Sync,
{
    let endpoints = ChannelCommunications::create_group(num_partitions);
    thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let make = &make;
                scope.spawn(move || {
                    let rank = rank as u32;
                    match make(rank, comm) {
                        Ok(mut sim) => run_simulation(&mut sim, network),
                        Err(e) => RunReport {
                            run_id: Uuid::nil(),
                            termination: None,
                            error: Some(e),
                            events: 0,
                            sim_time: TimeValue::ZERO,
                            fingerprint: String::new(),
                        },
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join().unwrap_or_else(|_| RunReport {
                    run_id: Uuid::nil(),
                    termination: None,
                    error: Some(SimError::runtime(format!("partition {} panicked", rank))),
                    events: 0,
                    sim_time: TimeValue::ZERO,
                    fingerprint: String::new(),
                })
            })
            .collect()
    })
}
