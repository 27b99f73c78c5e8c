// Tests for the simulation kernel: event loop, limits, stages and teardown
#[cfg(test)]
mod tests {
    use crate::core::{
        components::component::Module,
        components::component_type::{ComponentType, TypeRegistry},
        components::context::{ModuleContext, SimContext},
        components::gates::GateDecl,
        components::params::{ParamDecl, ParamType, ParamValue},
        errors::{SimError, SimResult, TerminationReason},
        event::{Event, EventKind, Message},
        execution::config::KernelConfig,
        execution::environment::ParameterEnvironment,
        execution::lifecycle::{LifecycleEvent, LifecycleListener, LifecycleNotice},
        execution::runner::{run_simulation, RunLimit, RunStatus},
        execution::simulation::{Simulation, Stage},
        fes::FesKind,
        time::TimeValue,
        types::{ComponentId, EventId},
    };
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Sends one job to `out` from initialize, `delay` later
    struct Source {
        delay: TimeValue,
    }

    impl Module for Source {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.send_via(Message::new("job"), "out", None, self.delay)
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    struct Sink {
        log: Log,
    }

    impl Module for Sink {
        fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, msg: Message) -> SimResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}@{}", msg.name(), ctx.now()));
            Ok(())
        }

        fn finish(&mut self, ctx: &mut ModuleContext<'_>) -> SimResult {
            self.log.lock().unwrap().push(format!("finish {}", ctx.full_path()));
            Ok(())
        }
    }

    /// Deletes itself on its first message
    struct Doomed;

    impl Module for Doomed {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.schedule_at(TimeValue::from_secs(1), Message::new("first"))?;
            ctx.schedule_at(TimeValue::from_secs(2), Message::new("second"))?;
            Ok(())
        }

        fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            ctx.delete_self()
        }
    }

    /// Creates a `test.Hitman` when its timer fires and logs whether it is
    /// itself still registered afterwards
    struct Summoner {
        log: Log,
    }

    impl Module for Summoner {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.schedule_at(TimeValue::from_secs(1), Message::new("summon")).map(|_| ())
        }

        fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            ctx.create_component("test.Hitman", "hitman", None)?;
            let alive = ctx.find_component("Lair.summoner")?.is_some();
            self.log.lock().unwrap().push(format!("alive {}", alive));
            ctx.schedule_at(TimeValue::from_secs(2), Message::new("later")).map(|_| ())
        }
    }

    /// Deletes `Lair.summoner` from its initialize
    struct Hitman;

    impl Module for Hitman {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            match ctx.find_component("Lair.summoner")? {
                Some(target) => ctx.delete_component(target),
                None => Err(SimError::runtime("nobody to delete").into()),
            }
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    /// Records (stage, path) for each initialization call
    struct Staged {
        log: Log,
    }

    impl Module for Staged {
        fn num_init_stages(&self) -> u32 {
            2
        }

        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, stage: u32) -> SimResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", stage, ctx.full_path()));
            Ok(())
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    fn types(log: &Log) -> Arc<TypeRegistry> {
        let mut reg = TypeRegistry::with_builtins();
        reg.register(
            ComponentType::simple("test.Source", || Source {
                delay: TimeValue::from_secs(10),
            })
            .gate(GateDecl::output("out")),
        )
        .unwrap();
        let sink_log = log.clone();
        reg.register(
            ComponentType::simple("test.Sink", move || Sink { log: sink_log.clone() })
                .gate(GateDecl::input("in")),
        )
        .unwrap();
        reg.register(ComponentType::simple("test.Doomed", || Doomed)).unwrap();
        let summoner_log = log.clone();
        reg.register(ComponentType::simple("test.Summoner", move || Summoner {
            log: summoner_log.clone(),
        }))
        .unwrap();
        reg.register(ComponentType::simple("test.Hitman", || Hitman)).unwrap();
        reg.register(
            ComponentType::compound("test.Lair", |b| b.submodule("test.Summoner", "summoner").map(|_| ()))
                .network(),
        )
        .unwrap();
        let staged_log = log.clone();
        reg.register(ComponentType::simple("test.Staged", move || Staged {
            log: staged_log.clone(),
        }))
        .unwrap();
        reg.register(
            ComponentType::compound("test.Chain", |b| {
                let src = b.submodule("test.Source", "src")?;
                let sink = b.submodule("test.Sink", "sink")?;
                b.connect(&src.gate("out"), &sink.gate("in"))
            })
            .network(),
        )
        .unwrap();
        reg.register(
            ComponentType::compound("test.Idle", |b| b.submodule("test.Sink", "sink").map(|_| ()))
                .network(),
        )
        .unwrap();
        reg.register(
            ComponentType::compound("test.Doom", |b| b.submodule("test.Doomed", "d").map(|_| ()))
                .network(),
        )
        .unwrap();
        reg.register(
            ComponentType::compound("test.Inner", |b| {
                b.submodule_vector("test.Staged", "leaf", 2).map(|_| ())
            })
            .param(ParamDecl::new("size", ParamType::Int).with_default(ParamValue::Int(0))),
        )
        .unwrap();
        reg.register(
            ComponentType::compound("test.Layers", |b| {
                b.submodule("test.Staged", "top")?;
                b.submodule("test.Inner", "inner").map(|_| ())
            })
            .network(),
        )
        .unwrap();
        Arc::new(reg)
    }

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn message_at(id: u64, secs: i64, priority: i16, name: &str) -> Event {
        let mut msg = Message::new(name).with_priority(priority);
        msg.arrival_time = TimeValue::from_secs(secs);
        msg.arrival_component = Some(ComponentId::new(1));
        Event::message(EventId::new(id), msg)
    }

    #[test]
    fn test_fes_orders_by_time_priority_then_insertion() {
        for kind in [FesKind::Heap, FesKind::Lazy] {
            let mut fes = kind.create();
            fes.insert(message_at(1, 5, 0, "a"));
            fes.insert(message_at(2, 5, 0, "b"));
            fes.insert(message_at(3, 3, 0, "c"));
            fes.insert(message_at(4, 5, -1, "urgent"));
            let order: Vec<String> = std::iter::from_fn(|| fes.extract_first())
                .map(|e| e.name().to_string())
                .collect();
            assert_eq!(order, ["c", "urgent", "a", "b"], "{:?}", kind);
        }
    }

    proptest! {
        #[test]
        fn test_fes_extraction_is_sorted(entries in prop::collection::vec((0i64..20, -2i16..3), 1..60), lazy in any::<bool>()) {
            let mut fes = if lazy { FesKind::Lazy.create() } else { FesKind::Heap.create() };
            for (i, (t, p)) in entries.iter().enumerate() {
                fes.insert(message_at(i as u64 + 1, *t, *p, "e"));
            }
            let mut keys = Vec::new();
            while let Some(ev) = fes.extract_first() {
                keys.push(ev.sort_key());
            }
            prop_assert_eq!(keys.len(), entries.len());
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_chain_delivers_then_stops_at_time_limit() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Chain").unwrap();
        sim.call_initialize().unwrap();
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
        assert_eq!(sim.now(), TimeValue::from_secs(20));
        // the job and the end-of-run event
        assert_eq!(sim.event_number(), 2);
        assert_eq!(log.lock().unwrap().as_slice(), &["job@10".to_string()]);
    }

    #[test]
    fn test_component_ids_start_at_one_and_are_not_reused() {
        let log = new_log();
        let mut sim = Simulation::new(KernelConfig::default(), types(&log)).unwrap();
        let root = sim.setup_network("test.Chain").unwrap();
        assert_eq!(root.raw(), 1);
        let sink = sim.find_component("Chain.sink").unwrap();
        assert_eq!(sink.raw(), 3);
        sim.delete_component(sink).unwrap();
        assert!(sim.component(sink).is_none());
        let again = sim.create_component("test.Sink", "sink", None).unwrap();
        assert_eq!(again.raw(), 4);
        assert_eq!(sim.registry().last_id(), 4);
    }

    #[test]
    fn test_resetting_time_limit_keeps_one_end_event() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Idle").unwrap();
        sim.set_sim_time_limit(Some(TimeValue::from_secs(30))).unwrap();
        sim.set_sim_time_limit(Some(TimeValue::from_secs(25))).unwrap();
        let ends: Vec<TimeValue> = sim
            .fes()
            .iter()
            .filter(|e| matches!(e.kind(), EventKind::EndSimulation))
            .map(Event::arrival_time)
            .collect();
        assert_eq!(ends, [TimeValue::from_secs(25)]);
        sim.set_sim_time_limit(None).unwrap();
        assert!(sim.fes().is_empty());
    }

    #[test]
    fn test_time_limit_in_the_past_is_rejected() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Chain").unwrap();
        sim.call_initialize().unwrap();
        assert!(matches!(
            sim.run_until(RunLimit::until_time(TimeValue::from_secs(15))),
            Ok(RunStatus::Paused)
        ));
        assert_eq!(sim.now(), TimeValue::from_secs(10));
        assert!(matches!(
            sim.set_sim_time_limit(Some(TimeValue::from_secs(5))),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_run_until_pauses_and_continues() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Chain").unwrap();
        sim.call_initialize().unwrap();
        let status = sim.run_until(RunLimit::until_time(TimeValue::from_secs(5))).unwrap();
        assert_eq!(status, RunStatus::Paused);
        assert_eq!(sim.event_number(), 0);
        assert_eq!(sim.guess_next_time(), Some(TimeValue::from_secs(10)));
        let status = sim.run_until(RunLimit::until_event(1)).unwrap();
        assert_eq!(status, RunStatus::Paused);
        assert_eq!(sim.now(), TimeValue::from_secs(10));
        match sim.run_until(RunLimit::none()).unwrap() {
            RunStatus::Terminated(t) => assert_eq!(t.reason, TerminationReason::SimTimeLimit),
            other => panic!("unexpected {:?}", other),
        }
        // a finished run cannot be continued
        assert!(matches!(sim.run(), Err(SimError::Stage(_))));
    }

    #[test]
    fn test_event_limit_terminates() {
        let log = new_log();
        let config = KernelConfig::default()
            .with_sim_time_limit(TimeValue::from_secs(20))
            .with_event_limit(1);
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        let report = run_simulation(&mut sim, "test.Chain");
        let termination = report.termination.unwrap();
        assert_eq!(termination.reason, TerminationReason::EventLimit);
        assert_eq!(report.events, 1);
    }

    #[test]
    fn test_running_out_of_events_is_an_error() {
        let log = new_log();
        let mut sim = Simulation::new(KernelConfig::default(), types(&log)).unwrap();
        sim.setup_network("test.Idle").unwrap();
        sim.call_initialize().unwrap();
        let err = sim.run().unwrap_err();
        assert!(err.to_string().contains("No more events"));
        // the tree is still intact and can be deleted
        assert!(sim.registry().len() > 0);
        sim.delete_network().unwrap();
        assert_eq!(sim.stage(), Stage::None);
    }

    #[test]
    fn test_self_deletion_is_deferred_until_event_returns() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(5));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Doom").unwrap();
        sim.call_initialize().unwrap();
        let d = sim.find_component("Doom.d").unwrap();
        assert_eq!(sim.fes().len(), 3);
        let ev = sim.take_next_event().unwrap().unwrap();
        sim.execute_event(ev).unwrap();
        assert!(sim.component(d).is_none());
        // its pending timer went with it; only the end event is left
        assert_eq!(sim.fes().len(), 1);
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
    }

    #[test]
    fn test_deleting_a_caller_further_up_the_stack_waits_for_it() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(5));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Lair").unwrap();
        sim.call_initialize().unwrap();
        let summoner = sim.find_component("Lair.summoner").unwrap();
        let ev = sim.take_next_event().unwrap().unwrap();
        sim.execute_event(ev).unwrap();
        // the hitman's request was carried out only once the summoner returned
        assert_eq!(log.lock().unwrap().as_slice(), &["alive true".to_string()]);
        assert!(sim.component(summoner).is_none());
        assert!(sim.find_component("Lair.hitman").is_some());
        assert!(sim.pending_deletes.is_empty());
        // the timer it set on its way out went with it
        assert_eq!(sim.fes().len(), 1);
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
    }

    #[test]
    fn test_time_scale_cannot_change_under_a_live_simulation() {
        let log = new_log();
        let first = Simulation::new(KernelConfig::default(), types(&log));
        assert!(first.is_ok());
        let coarse = Simulation::new(KernelConfig::default().with_time_scale_exp(-3), types(&log));
        assert!(matches!(coarse, Err(SimError::Config(_))));
        assert_eq!(TimeValue::from_secs(1).raw(), 1_000_000_000_000);
    }

    #[test]
    fn test_interrupted_run_skips_fingerprint_check() {
        let log = new_log();
        let config = KernelConfig::default()
            .with_sim_time_limit(TimeValue::from_secs(20))
            .with_fingerprint("0000-0000");
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        sim.setup_network("test.Chain").unwrap();
        sim.call_initialize().unwrap();
        sim.stop_handle().store(true, Ordering::SeqCst);
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::Interrupted);
        assert!(!termination.message.contains("verified"), "{}", termination.message);
    }

    #[test]
    fn test_initialization_stages_run_over_the_whole_tree() {
        let log = new_log();
        let mut sim = Simulation::new(KernelConfig::default(), types(&log)).unwrap();
        sim.setup_network("test.Layers").unwrap();
        sim.call_initialize().unwrap();
        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen,
            [
                "0 Layers.top",
                "0 Layers.inner.leaf[0]",
                "0 Layers.inner.leaf[1]",
                "1 Layers.top",
                "1 Layers.inner.leaf[0]",
                "1 Layers.inner.leaf[1]",
            ]
        );
        assert!(sim.registry().iter().all(|c| c.is_initialized()));
    }

    #[test]
    fn test_finish_runs_children_before_parents() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        let report = run_simulation(&mut sim, "test.Chain");
        assert!(report.is_success());
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["job@10".to_string(), "finish Chain.sink".to_string()]
        );
        assert_eq!(sim.stage(), Stage::None);
        assert!(sim.registry().is_empty());
    }

    #[test]
    fn test_fingerprint_is_verified() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config.clone(), types(&log)).unwrap();
        let first = run_simulation(&mut sim, "test.Chain");
        assert!(first.is_success());

        let mut sim = Simulation::new(config.clone().with_fingerprint(&first.fingerprint), types(&log)).unwrap();
        let verified = run_simulation(&mut sim, "test.Chain");
        assert!(verified.termination.unwrap().message.contains("fingerprint verified"));

        let wrong = if first.fingerprint == "0000-0000" { "0000-0001" } else { "0000-0000" };
        let mut sim = Simulation::new(config.with_fingerprint(wrong), types(&log)).unwrap();
        let failed = run_simulation(&mut sim, "test.Chain");
        assert!(failed.error.unwrap().to_string().contains("Fingerprint mismatch"));
    }

    #[test]
    fn test_parameters_resolve_through_environment() {
        let log = new_log();
        let mut sim = Simulation::new(KernelConfig::default(), types(&log))
            .unwrap()
            .with_environment(Box::new(
                ParameterEnvironment::new().assign("**.inner.size", ParamValue::Int(4)),
            ));
        sim.setup_network("test.Layers").unwrap();
        let inner = sim.find_component("Layers.inner").unwrap();
        assert_eq!(sim.op_par(inner, "size").unwrap(), ParamValue::Int(4));
    }

    struct Recorder {
        seen: Mutex<Vec<LifecycleEvent>>,
    }

    impl LifecycleListener for Recorder {
        fn lifecycle_event(&self, notice: &LifecycleNotice) -> Result<(), SimError> {
            self.seen.lock().unwrap().push(notice.event);
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_events_in_order() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        sim.add_lifecycle_listener(recorder.clone());
        assert!(run_simulation(&mut sim, "test.Chain").is_success());
        use LifecycleEvent::*;
        assert_eq!(
            recorder.seen.lock().unwrap().as_slice(),
            &[
                PreNetworkSetup,
                PostNetworkSetup,
                PreNetworkInitialize,
                PostNetworkInitialize,
                OnSimulationStart,
                OnSimulationSuccess,
                PreNetworkFinish,
                PostNetworkFinish,
                PreNetworkDelete,
                PostNetworkDelete,
            ]
        );
    }

    #[test]
    fn test_network_can_be_rebuilt_after_delete() {
        let log = new_log();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(20));
        let mut sim = Simulation::new(config, types(&log)).unwrap();
        assert!(run_simulation(&mut sim, "test.Chain").is_success());
        let root = sim.setup_network("test.Chain").unwrap();
        assert_eq!(root.raw(), 1);
        assert_eq!(sim.now(), TimeValue::ZERO);
        assert!(sim.setup_network("test.Chain").is_err());
    }
}
