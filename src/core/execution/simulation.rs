//! The simulation kernel.
//!
//! A `Simulation` owns one network and drives it through the stages
//! `None -> Build -> Initialize -> Event -> Finish -> Cleanup -> None`.
//! Building and tearing down the component tree lives in `network`,
//! message passing and the services offered to components in `messaging`.

use crate::core::components::component::ComponentKind;
use crate::core::components::component_type::TypeRegistry;
use crate::core::components::ownership::Owner;
use crate::core::components::registry::ComponentRegistry;
use crate::core::components::Component;
use crate::core::errors::{Interrupt, SimError, SimResult, Termination, TerminationReason};
use crate::core::event::{Event, EventKind};
use crate::core::execution::config::{KernelConfig, SchedulerKind};
use crate::core::execution::coroutine::ExecutionContext;
use crate::core::execution::environment::{Environment, NullEnvironment};
use crate::core::execution::fingerprint::Hasher;
use crate::core::execution::lifecycle::{
    LifecycleEvent, LifecycleListener, LifecycleListeners, LifecycleNotice,
};
use crate::core::execution::runner::{RunLimit, RunStatus};
use crate::core::fes::FutureEventSet;
use crate::core::parsim::communications::Communications;
use crate::core::parsim::null_message::NullMessageScheduler;
use crate::core::parsim::partition::Partition;
use crate::core::rng::RngManager;
use crate::core::scheduler::{
    RealTimeScheduler, Scheduler, SchedulerContext, SequentialScheduler,
};
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId, UniqueNumbers};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Stage of a simulation's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    None,
    Build,
    Initialize,
    Event,
    Finish,
    Cleanup,
}

/// How the last run ended, once it has
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Terminated(Termination),
    Failed(SimError),
}

pub struct Simulation {
    pub(crate) config: KernelConfig,
    pub(crate) types: Arc<TypeRegistry>,
    pub(crate) registry: ComponentRegistry,
    pub(crate) fes: Box<dyn FutureEventSet>,
    scheduler: Box<dyn Scheduler>,
    pub(crate) partition: Option<Partition>,
    pub(crate) env: Box<dyn Environment>,
    pub(crate) ids: UniqueNumbers,
    initial_ids: UniqueNumbers,
    pub(crate) now: TimeValue,
    event_number: u64,
    stage: Stage,
    end_event: Option<EventId>,
    /// Components whose code is on the call stack, innermost last
    pub(crate) executing: Vec<ComponentId>,
    pub(crate) pending_deletes: Vec<ComponentId>,
    pub(crate) contexts: HashMap<ComponentId, ExecutionContext>,
    listeners: LifecycleListeners,
    run_id: Uuid,
    pub(crate) rngs: RngManager,
    fingerprint: Hasher,
    expected_fingerprint: Option<u32>,
    stop_flag: Arc<AtomicBool>,
    run_started: Option<Instant>,
    scheduler_started: bool,
    network_type: Option<String>,
    outcome: Option<Outcome>,
}

impl Simulation {
    /// Create a new kernel instance for the given configuration and type set
    pub fn new(config: KernelConfig, types: Arc<TypeRegistry>) -> Result<Self, SimError> {
        config.validate()?;
        TimeValue::set_scale_exp(config.time_scale_exp)?;
        let expected_fingerprint = config
            .fingerprint
            .as_deref()
            .map(Hasher::parse)
            .transpose()?;
        let scheduler: Box<dyn Scheduler> = match config.scheduler {
            SchedulerKind::Sequential => Box::new(SequentialScheduler::new()),
            SchedulerKind::RealTime { speed } => Box::new(RealTimeScheduler::new(speed)),
        };
        let run_id = Uuid::new_v4();
        debug!("simulation {} created ({} types)", run_id, types.len());
        Ok(Self {
            fes: config.fes.create(),
            registry: ComponentRegistry::new(config.allow_object_stealing),
            rngs: RngManager::new(config.seed),
            config,
            types,
            scheduler,
            partition: None,
            env: Box::new(NullEnvironment),
            ids: UniqueNumbers::new(),
            initial_ids: UniqueNumbers::new(),
            now: TimeValue::ZERO,
            event_number: 0,
            stage: Stage::None,
            end_event: None,
            executing: Vec::new(),
            pending_deletes: Vec::new(),
            contexts: HashMap::new(),
            listeners: LifecycleListeners::new(),
            run_id,
            fingerprint: Hasher::new(),
            expected_fingerprint,
            stop_flag: Arc::new(AtomicBool::new(false)),
            run_started: None,
            scheduler_started: false,
            network_type: None,
            outcome: None,
        })
    }

    pub fn with_environment(mut self, env: Box<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    /// Replace the scheduler chosen by the configuration
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Join a distributed run. Requires the `parsim` configuration section;
    /// installs the null message scheduler and this partition's slice of
    /// the unique number space.
    pub fn with_communications(mut self, comm: Box<dyn Communications>) -> Result<Self, SimError> {
        let parsim = self.config.parsim.clone().ok_or_else(|| {
            SimError::Config("communications given but no partitioning configured".to_string())
        })?;
        let partition = Partition::new(parsim.clone(), comm)?;
        self.scheduler = Box::new(NullMessageScheduler::new(
            parsim.partition_id,
            parsim.num_partitions,
            parsim.lookahead,
        ));
        self.ids = UniqueNumbers::for_partition(parsim.partition_id, parsim.num_partitions)?;
        self.initial_ids = self.ids.clone();
        self.partition = Some(partition);
        Ok(self)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current simulation time
    pub fn now(&self) -> TimeValue {
        self.now
    }

    /// Number of events executed so far in this run
    pub fn event_number(&self) -> u64 {
        self.event_number
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.registry.by_id(id)
    }

    pub fn root(&self) -> Option<ComponentId> {
        self.registry.root()
    }

    pub fn full_path(&self, id: ComponentId) -> Option<String> {
        self.registry.full_path(id)
    }

    pub fn find_component(&self, path: &str) -> Option<ComponentId> {
        self.registry.find_by_path(path)
    }

    pub fn fes(&self) -> &dyn FutureEventSet {
        self.fes.as_ref()
    }

    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    pub fn scheduler_name(&self) -> &str {
        self.scheduler.name()
    }

    pub fn network_type(&self) -> Option<&str> {
        self.network_type.as_deref()
    }

    /// Fingerprint of the events executed so far, in `xxxx-xxxx` form
    pub fn fingerprint(&self) -> String {
        self.fingerprint.to_string()
    }

    /// Execution context of an activity component, while it exists
    pub fn execution_context(&self, id: ComponentId) -> Option<&ExecutionContext> {
        self.contexts.get(&id)
    }

    /// Flag that stops the run before the next event when set, from any thread
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn add_lifecycle_listener(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_lifecycle_listener(&mut self, listener: &Arc<dyn LifecycleListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Notify lifecycle listeners in subscription order. The list is copied
    /// first, so changes to it take effect from the next notification.
    fn notify(&mut self, event: LifecycleEvent, detail: Option<String>) -> Result<(), SimError> {
        let notice = LifecycleNotice {
            event,
            run_id: self.run_id,
            sim_time: self.now,
            detail,
        };
        for listener in self.listeners.snapshot() {
            listener.lifecycle_event(&notice)?;
        }
        Ok(())
    }

    /// Notify during teardown: problems are reported, not propagated
    fn notify_quietly(&mut self, event: LifecycleEvent, detail: Option<String>) {
        if let Err(e) = self.notify(event, detail) {
            self.env.teardown_error(&e);
        }
    }

    fn check_stage(&self, expected: Stage, what: &str) -> Result<(), SimError> {
        if self.stage != expected {
            return Err(SimError::Stage(format!(
                "{}: expected stage {:?}, simulation is in stage {:?}",
                what, expected, self.stage
            )));
        }
        Ok(())
    }

    fn with_scheduler_ctx<R>(
        &mut self,
        f: impl FnOnce(&mut dyn Scheduler, &mut SchedulerContext<'_>) -> R,
    ) -> R {
        let mut ctx = SchedulerContext {
            fes: self.fes.as_mut(),
            ids: &mut self.ids,
            partition: self.partition.as_mut(),
            now: self.now,
        };
        f(self.scheduler.as_mut(), &mut ctx)
    }

    /// Build the network of type `network_type`
    pub fn setup_network(&mut self, network_type: &str) -> Result<ComponentId, SimError> {
        self.check_stage(Stage::None, "setup_network()")?;
        if !self.registry.is_empty() {
            return Err(SimError::Stage(
                "setup_network(): delete the previous network first".to_string(),
            ));
        }
        if self.config.parsim.is_some() && self.partition.is_none() {
            return Err(SimError::Config(
                "partitioned run configured without communications".to_string(),
            ));
        }
        let ty = self.types.get(network_type)?;
        if !ty.is_network() {
            return Err(SimError::Registry(format!(
                "type '{}' is not a network",
                network_type
            )));
        }
        info!("setting up network '{}'", network_type);
        self.stage = Stage::Build;
        self.network_type = Some(network_type.to_string());
        self.outcome = None;
        self.notify(LifecycleEvent::PreNetworkSetup, Some(network_type.to_string()))?;
        let root = self.insert_component(ty.clone(), ty.name(), None, None, &[])?;
        self.build_inside(root)?;
        self.set_sim_time_limit(self.config.sim_time_limit)?;
        self.notify(LifecycleEvent::PostNetworkSetup, Some(network_type.to_string()))?;
        debug!("network '{}' built: {} components", network_type, self.registry.len());
        Ok(root)
    }

    /// Change the simulation time limit. The single pending end event is
    /// cancelled and, for a new limit, rescheduled.
    pub fn set_sim_time_limit(&mut self, limit: Option<TimeValue>) -> Result<(), SimError> {
        if let Some(t) = limit {
            if t < self.now {
                return Err(SimError::Config(format!(
                    "simulation time limit t={} already passed (now t={})",
                    t, self.now
                )));
            }
        }
        if let Some(old) = self.end_event.take() {
            self.fes.remove(old);
        }
        self.config.sim_time_limit = limit;
        if self.stage == Stage::None {
            return Ok(());
        }
        if let Some(t) = limit {
            let id = self.ids.next_event_id()?;
            self.fes.insert(Event::end_simulation(id, t));
            self.end_event = Some(id);
        }
        Ok(())
    }

    /// Initialize every component, stage by stage, and enter the event stage
    pub fn call_initialize(&mut self) -> Result<(), SimError> {
        self.check_stage(Stage::Build, "call_initialize()")?;
        let root = self
            .registry
            .root()
            .ok_or_else(|| SimError::Stage("call_initialize(): no network".to_string()))?;
        self.stage = Stage::Initialize;
        self.now = TimeValue::ZERO;
        self.event_number = 0;
        self.fingerprint.reset();
        self.notify(LifecycleEvent::PreNetworkInitialize, self.network_type.clone())?;
        info!("initializing network");
        self.initialize_subtree(root)?;
        self.notify(LifecycleEvent::PostNetworkInitialize, self.network_type.clone())?;
        self.stage = Stage::Event;
        Ok(())
    }

    /// Schedule the starters of the activities below `root`, then run the
    /// initialization stages over the subtree, parents before children
    pub(crate) fn initialize_subtree(&mut self, root: ComponentId) -> Result<(), SimError> {
        // components created and initialized earlier in this pass are skipped
        let order: Vec<ComponentId> = self
            .registry
            .tree
            .subtree_pre_order(root)
            .into_iter()
            .filter(|&id| self.registry.by_id(id).map_or(false, |c| !c.initialized))
            .collect();
        for &id in &order {
            if self.registry.by_id(id).map(Component::kind) == Some(ComponentKind::Activity) {
                let ev_id = self.ids.next_event_id()?;
                self.fes.insert(Event::activity_start(ev_id, id, self.now));
            }
        }
        let stages = order
            .iter()
            .filter_map(|&id| self.registry.by_id(id))
            .map(Component::num_init_stages)
            .max()
            .unwrap_or(0);
        for stage in 0..stages {
            trace!("initialization stage {}", stage);
            let order = self.registry.tree.subtree_pre_order(root);
            for id in order {
                let takes_part = self
                    .registry
                    .by_id(id)
                    .map_or(false, |c| !c.initialized && c.num_init_stages() > stage);
                if !takes_part {
                    continue;
                }
                let result = self.call_module(id, |m, ctx| m.initialize(ctx, stage));
                self.settle_outside_events(result)?;
            }
        }
        for id in order {
            if let Some(c) = self.registry.by_id_mut(id) {
                c.initialized = true;
            }
        }
        Ok(())
    }

    /// Handle the outcome of component code run outside the event loop:
    /// deletions happen right away, termination is out of place there
    fn settle_outside_events(&mut self, result: SimResult) -> Result<(), SimError> {
        match self.apply_deferred(result) {
            Ok(()) => Ok(()),
            Err(interrupt) => Err(interrupt.into_error()),
        }
    }

    /// Run without a breakpoint until the run terminates or fails
    pub fn run(&mut self) -> Result<Termination, SimError> {
        match self.run_until(RunLimit::none())? {
            RunStatus::Terminated(t) => Ok(t),
            RunStatus::Paused => Err(SimError::internal("unbounded run paused")),
        }
    }

    /// Execute events until a termination, an error, or `limit`
    pub fn run_until(&mut self, limit: RunLimit) -> Result<RunStatus, SimError> {
        self.check_stage(Stage::Event, "run()")?;
        if let Some(outcome) = &self.outcome {
            return Err(SimError::Stage(format!(
                "run(): the simulation has already ended ({:?})",
                outcome
            )));
        }
        if !self.scheduler_started {
            if let Err(i) = self.with_scheduler_ctx(|s, ctx| s.start_run(ctx)) {
                return self.conclude(i);
            }
            self.scheduler_started = true;
            self.run_started = Some(Instant::now());
            info!("running simulation (scheduler: {})", self.scheduler.name());
            self.notify(LifecycleEvent::OnSimulationStart, self.network_type.clone())?;
        } else {
            self.notify(LifecycleEvent::OnSimulationResume, None)?;
        }
        loop {
            if self.stop_flag.swap(false, Ordering::SeqCst) {
                return self.conclude(Termination::interrupted().into());
            }
            if let Some(max) = self.config.event_limit {
                if self.event_number >= max {
                    return self.conclude(Termination::event_limit(self.event_number).into());
                }
            }
            if let (Some(ms), Some(started)) = (self.config.real_time_limit_ms, self.run_started) {
                let elapsed = started.elapsed().as_millis() as u64;
                if elapsed >= ms {
                    return self.conclude(Termination::real_time_limit(elapsed).into());
                }
            }
            let event = match self.take_next_event() {
                Ok(Some(ev)) => ev,
                Ok(None) => {
                    return self.conclude(
                        SimError::runtime(
                            "No more events, simulation ended without a termination condition",
                        )
                        .into(),
                    )
                }
                Err(i) => return self.conclude(i),
            };
            let past_time = limit.sim_time.map_or(false, |t| event.arrival_time() > t);
            let past_events = limit.event_number.map_or(false, |n| self.event_number >= n);
            if past_time || past_events {
                self.put_back_event(event);
                debug!("paused at t={} before event #{}", self.now, self.event_number + 1);
                self.notify(LifecycleEvent::OnSimulationPause, None)?;
                return Ok(RunStatus::Paused);
            }
            if let Err(i) = self.execute_event(event) {
                return self.conclude(i);
            }
        }
    }

    /// Take the next event the scheduler lets us execute
    pub fn take_next_event(&mut self) -> SimResult<Option<Event>> {
        self.with_scheduler_ctx(|s, ctx| s.take_next_event(ctx))
    }

    /// Return an event taken but not executed
    pub fn put_back_event(&mut self, event: Event) {
        self.with_scheduler_ctx(|s, ctx| s.put_back_event(ctx, event));
    }

    pub fn guess_next_event(&self) -> Option<&Event> {
        self.scheduler.guess_next_event(self.fes.as_ref())
    }

    pub fn guess_next_time(&self) -> Option<TimeValue> {
        self.guess_next_event().map(Event::arrival_time)
    }

    /// Execute one event: advance time, count it, run its behavior, then
    /// carry out deletions deferred while component code was running
    pub fn execute_event(&mut self, event: Event) -> SimResult {
        if event.arrival_time() < self.now {
            return Err(SimError::internal(format!(
                "causality violation: event '{}' at t={} while simulation time is t={}",
                event.name(),
                event.arrival_time(),
                self.now
            ))
            .into());
        }
        self.now = event.arrival_time();
        self.event_number += 1;
        self.env.simulation_event(&event);
        trace!("#{} t={} '{}'", self.event_number, self.now, event.name());
        let result = match event.kind {
            EventKind::EndSimulation => {
                self.end_event = None;
                Err(Termination::sim_time_limit(self.now).into())
            }
            EventKind::ActivityStart(component) => self.start_activity(component),
            EventKind::Message(msg) => {
                self.fingerprint.add_i64(self.now.raw());
                self.fingerprint
                    .add_u32(msg.arrival_component().map_or(0, ComponentId::raw));
                self.deliver(*msg)
            }
        };
        self.apply_deferred(result)
    }

    /// Turn a deletion request into a pending deletion and, once no
    /// component code is left on the call stack, carry out all pending
    /// deletions
    pub(crate) fn apply_deferred(&mut self, result: SimResult) -> SimResult {
        let result = match result {
            Err(Interrupt::DeleteComponent(id)) => {
                self.pending_deletes.push(id);
                Ok(())
            }
            other => other,
        };
        if !self.executing.is_empty() {
            return result;
        }
        for id in std::mem::take(&mut self.pending_deletes) {
            if self.registry.contains(id) {
                debug!("carrying out deferred deletion of {}", id);
                self.delete_subtree(id)?;
            }
        }
        result
    }

    /// End the run with `interrupt`. Returns the termination, or the error
    /// for a failed run.
    fn conclude(&mut self, interrupt: Interrupt) -> Result<RunStatus, SimError> {
        let mut termination = match interrupt {
            Interrupt::Terminated(t) => t,
            Interrupt::Failed(e) => return Err(self.fail(e)),
            other => return Err(self.fail(other.into_error())),
        };
        // an interrupted run stops at an arbitrary point, nothing to compare
        let expected = self
            .expected_fingerprint
            .filter(|_| termination.reason != TerminationReason::Interrupted);
        if let Some(expected) = expected {
            if self.fingerprint.value() != expected {
                let err = SimError::runtime(format!(
                    "Fingerprint mismatch! calculated: {}, expected: {}",
                    self.fingerprint,
                    self.config.fingerprint.as_deref().unwrap_or_default()
                ));
                return Err(self.fail(err));
            }
            termination.message = format!("{} (fingerprint verified)", termination.message);
        }
        if !matches!(
            termination.reason,
            TerminationReason::SimTimeLimit | TerminationReason::RemoteTermination
        ) {
            if let Some(partition) = self.partition.as_mut() {
                if let Err(e) = partition.broadcast_termination(&termination) {
                    warn!("could not notify peer partitions of termination: {}", e);
                }
            }
        }
        self.end_scheduler_run();
        info!("{} (t={}, {} events)", termination, self.now, self.event_number);
        self.outcome = Some(Outcome::Terminated(termination.clone()));
        self.notify(LifecycleEvent::OnSimulationSuccess, Some(termination.message.clone()))?;
        Ok(RunStatus::Terminated(termination))
    }

    fn fail(&mut self, error: SimError) -> SimError {
        if !error.is_remote() {
            if let Some(partition) = self.partition.as_mut() {
                if let Err(e) = partition.broadcast_error(&error) {
                    warn!("could not notify peer partitions of the error: {}", e);
                }
            }
        }
        self.end_scheduler_run();
        warn!("simulation failed at t={}: {}", self.now, error);
        self.outcome = Some(Outcome::Failed(error.clone()));
        self.notify_quietly(LifecycleEvent::OnSimulationError, Some(error.to_string()));
        error
    }

    fn end_scheduler_run(&mut self) {
        if !self.scheduler_started {
            return;
        }
        self.scheduler_started = false;
        if let Err(i) = self.with_scheduler_ctx(|s, ctx| s.end_run(ctx)) {
            debug!("scheduler end of run: {}", i);
        }
    }

    /// Call every component's finish hook, children before their parent
    pub fn call_finish(&mut self) -> Result<(), SimError> {
        if self.stage != Stage::Event {
            return Err(SimError::Stage(format!(
                "call_finish(): simulation is in stage {:?}",
                self.stage
            )));
        }
        let root = self
            .registry
            .root()
            .ok_or_else(|| SimError::Stage("call_finish(): no network".to_string()))?;
        self.stage = Stage::Finish;
        self.notify(LifecycleEvent::PreNetworkFinish, None)?;
        info!("calling finish() at t={}", self.now);
        for id in self.registry.tree.subtree_post_order(root) {
            let result = self.call_module(id, |m, ctx| m.finish(ctx));
            if let Some(c) = self.registry.by_id_mut(id) {
                c.finished = true;
            }
            self.settle_outside_events(result)?;
        }
        self.notify(LifecycleEvent::PostNetworkFinish, None)?;
        Ok(())
    }

    /// Tear the network down and return to the initial stage. Problems are
    /// reported to the environment and do not stop the teardown.
    pub fn delete_network(&mut self) -> Result<(), SimError> {
        if let Some(running) = self.current() {
            return Err(SimError::Stage(format!(
                "delete_network(): component {} is executing",
                running
            )));
        }
        if self.stage == Stage::None && self.registry.is_empty() {
            return Ok(());
        }
        self.end_scheduler_run();
        self.stage = Stage::Cleanup;
        self.notify_quietly(LifecycleEvent::PreNetworkDelete, self.network_type.clone());
        for (_, mut ctx) in self.contexts.drain() {
            ctx.kill();
        }
        if let Some(root) = self.registry.root() {
            if let Err(e) = self.delete_subtree(root) {
                self.env.teardown_error(&e);
            }
        }
        for id in self.registry.tree.owned_by(Owner::Unassigned).to_vec() {
            if !self.registry.contains(id) {
                continue;
            }
            if let Err(e) = self.delete_subtree(id) {
                self.env.teardown_error(&e);
            }
        }
        let leftovers = self.registry.len();
        if leftovers > 0 {
            debug!("discarding {} components outside the tree", leftovers);
        }
        for ty in self.types.iter() {
            ty.clear_shared_params(self.run_id);
        }
        self.registry.reset();
        self.fes.clear();
        self.ids.reset_to(&self.initial_ids);
        self.pending_deletes.clear();
        self.end_event = None;
        self.now = TimeValue::ZERO;
        self.event_number = 0;
        self.run_started = None;
        self.fingerprint.reset();
        self.outcome = None;
        self.stage = Stage::None;
        info!("network deleted");
        let network_type = self.network_type.take();
        self.notify_quietly(LifecycleEvent::PostNetworkDelete, network_type);
        Ok(())
    }

    /// Component whose code is executing right now
    pub(crate) fn current(&self) -> Option<ComponentId> {
        self.executing.last().copied()
    }

    /// Whether `id` or anything below it has code on the call stack
    pub(crate) fn is_executing_within(&self, id: ComponentId) -> bool {
        self.executing
            .iter()
            .any(|&c| c == id || self.registry.tree.is_ancestor(id, c))
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.stage != Stage::None || !self.registry.is_empty() {
            if let Err(e) = self.delete_network() {
                warn!("could not delete network on drop: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("run_id", &self.run_id)
            .field("stage", &self.stage)
            .field("now", &self.now)
            .field("event_number", &self.event_number)
            .field("components", &self.registry.len())
            .field("pending_events", &self.fes.len())
            .finish()
    }
}
