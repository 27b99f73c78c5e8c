// Tests for activity modules running in their own execution contexts
#[cfg(test)]
mod tests {
    use crate::core::{
        components::component::Module,
        components::component_type::{ComponentType, TypeRegistry},
        components::context::{ModuleContext, SimContext},
        components::gates::GateDecl,
        errors::{Interrupt, SimError, SimResult, TerminationReason},
        event::Message,
        execution::config::KernelConfig,
        execution::coroutine::{ActivityContext, ContextState},
        execution::runner::{RunLimit, RunStatus},
        execution::simulation::Simulation,
        time::TimeValue,
    };
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Sends "poke" out of `out` one second in
    struct Poker;

    impl Module for Poker {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.send_via(Message::new("poke"), "out", None, TimeValue::from_secs(1))
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    /// Sends "job" out of `out` right away during initialization
    struct Eager;

    impl Module for Eager {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.send(Message::new("job"), "out")
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    /// Deletes `Net.worker` when its timer fires
    struct Killer;

    impl Module for Killer {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            ctx.schedule_at(TimeValue::from_secs(1), Message::new("kill")).map(|_| ())
        }

        fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            match ctx.find_component("Net.worker")? {
                Some(worker) => ctx.delete_component(worker),
                None => Err(SimError::runtime("worker not found").into()),
            }
        }
    }

    /// Deletes `Net.worker` from its initialize
    struct Assassin;

    impl Module for Assassin {
        fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
            match ctx.find_component("Net.worker")? {
                Some(worker) => ctx.delete_component(worker),
                None => Err(SimError::runtime("worker not found").into()),
            }
        }

        fn handle_message(&mut self, _ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
            Ok(())
        }
    }

    /// Registry with a network "test.Net" holding `worker`, an activity
    /// running `body`, and optionally a simple module `other` of type
    /// `other` connected to it
    fn simulation<F>(config: KernelConfig, body: F, other: Option<&str>) -> Simulation
    where
        F: Fn(&mut ActivityContext) -> SimResult + Send + Sync + 'static,
    {
        let mut reg = TypeRegistry::with_builtins();
        reg.register(ComponentType::activity("test.Worker", body).gate(GateDecl::input("in")))
            .unwrap();
        reg.register(ComponentType::simple("test.Poker", || Poker).gate(GateDecl::output("out")))
            .unwrap();
        reg.register(ComponentType::simple("test.Eager", || Eager).gate(GateDecl::output("out")))
            .unwrap();
        reg.register(ComponentType::simple("test.Killer", || Killer)).unwrap();
        reg.register(ComponentType::simple("test.Assassin", || Assassin)).unwrap();
        let other = other.map(str::to_string);
        reg.register(
            ComponentType::compound("test.Net", move |b| {
                let worker = b.submodule("test.Worker", "worker")?;
                match other.as_deref() {
                    Some("test.Killer") => b.submodule("test.Killer", "other").map(|_| ()),
                    Some(ty) => {
                        let o = b.submodule(ty, "other")?;
                        b.connect(&o.gate("out"), &worker.gate("in"))
                    }
                    None => Ok(()),
                }
            })
            .network(),
        )
        .unwrap();
        let mut sim = Simulation::new(config, Arc::new(reg)).unwrap();
        sim.setup_network("test.Net").unwrap();
        sim.call_initialize().unwrap();
        sim
    }

    #[test]
    fn test_wait_spans_events_until_model_ends_run() {
        let log = new_log();
        let seen = log.clone();
        let mut sim = simulation(
            KernelConfig::default(),
            move |ctx: &mut ActivityContext| {
                for _ in 0..3 {
                    ctx.wait(TimeValue::from_secs(1))?;
                    seen.lock().unwrap().push(ctx.now().to_string());
                }
                ctx.end_simulation()
            },
            None,
        );
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::EndedByModel);
        assert_eq!(sim.now(), TimeValue::from_secs(3));
        assert_eq!(log.lock().unwrap().as_slice(), &["1", "2", "3"]);
        // starter plus three wait timers
        assert_eq!(sim.event_number(), 4);
    }

    #[test]
    fn test_error_from_procedure_keeps_its_identity() {
        let mut sim = simulation(
            KernelConfig::default(),
            |ctx: &mut ActivityContext| {
                ctx.wait(TimeValue::from_secs(1))?;
                Err(SimError::Parameter("bad queue length".to_string()).into())
            },
            None,
        );
        let err = sim.run().unwrap_err();
        assert_eq!(err.root_cause(), &SimError::Parameter("bad queue length".to_string()));
        assert!(err.to_string().contains("Net.worker"));
        assert_eq!(sim.now(), TimeValue::from_secs(1));
    }

    #[test]
    fn test_message_during_wait_is_an_error() {
        let mut sim = simulation(
            KernelConfig::default(),
            |ctx: &mut ActivityContext| ctx.wait(TimeValue::from_secs(5)),
            Some("test.Poker"),
        );
        let err = sim.run().unwrap_err();
        assert!(err.to_string().contains("arrived during wait()"), "{}", err);
        assert_eq!(sim.now(), TimeValue::from_secs(1));
    }

    #[test]
    fn test_receive_timeout_gives_up() {
        let log = new_log();
        let seen = log.clone();
        let mut sim = simulation(
            KernelConfig::default(),
            move |ctx: &mut ActivityContext| {
                let got = ctx.receive_timeout(TimeValue::from_secs(2))?;
                seen.lock()
                    .unwrap()
                    .push(format!("{}@{}", got.is_some(), ctx.now()));
                let got = ctx.receive_timeout(TimeValue::from_secs(2))?;
                seen.lock()
                    .unwrap()
                    .push(format!("{}@{}", got.map(|m| m.name().to_string()).unwrap_or_default(), ctx.now()));
                ctx.end_simulation()
            },
            Some("test.Poker"),
        );
        // the poke comes in at t=1 during the first timeout
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::EndedByModel);
        assert_eq!(log.lock().unwrap().as_slice(), &["true@1", "@3"]);
    }

    #[test]
    fn test_starter_runs_before_messages_sent_during_initialize() {
        let log = new_log();
        let seen = log.clone();
        let mut sim = simulation(
            KernelConfig::default(),
            move |ctx: &mut ActivityContext| {
                let msg = ctx.receive()?;
                seen.lock().unwrap().push(format!("{}@{}", msg.name(), ctx.now()));
                ctx.end_simulation()
            },
            Some("test.Eager"),
        );
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::EndedByModel);
        assert_eq!(log.lock().unwrap().as_slice(), &["job@0"]);
    }

    #[test]
    fn test_deleting_suspended_activity_releases_its_context() {
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(5));
        let mut sim = simulation(
            config,
            |ctx: &mut ActivityContext| loop {
                ctx.wait(TimeValue::from_secs(10))?;
            },
            Some("test.Killer"),
        );
        let worker = sim.find_component("Net.worker").unwrap();
        let status = sim.run_until(RunLimit::until_time(TimeValue::from_millis(500))).unwrap();
        assert_eq!(status, RunStatus::Paused);
        let state = sim.execution_context(worker).map(|c| c.state());
        assert_eq!(state, Some(ContextState::Suspended));

        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
        assert!(sim.component(worker).is_none());
        assert!(sim.execution_context(worker).is_none());
    }

    #[test]
    fn test_activity_finishing_early_rejects_later_messages() {
        let mut sim = simulation(KernelConfig::default(), |_ctx: &mut ActivityContext| Ok(()), Some("test.Poker"));
        let err = sim.run().unwrap_err();
        assert!(err.to_string().contains("already terminated"), "{}", err);
    }

    #[test]
    fn test_running_activity_deleted_from_nested_call_stays_until_it_suspends() {
        let log = new_log();
        let seen = log.clone();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(5));
        let mut sim = simulation(
            config,
            move |ctx: &mut ActivityContext| {
                ctx.create_component("test.Assassin", "assassin", None)?;
                let me = ctx.find_component("Net.worker")?;
                seen.lock().unwrap().push(format!("registered {}", me.is_some()));
                ctx.wait(TimeValue::from_secs(1))?;
                seen.lock().unwrap().push("woke up".to_string());
                Ok(())
            },
            None,
        );
        let worker = sim.find_component("Net.worker").unwrap();
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
        assert_eq!(log.lock().unwrap().as_slice(), &["registered true"]);
        assert!(sim.component(worker).is_none());
        assert!(sim.execution_context(worker).is_none());
        assert!(sim.find_component("Net.assassin").is_some());
    }

    #[test]
    fn test_activity_deleting_itself_stays_registered_until_it_returns() {
        let log = new_log();
        let seen = log.clone();
        let config = KernelConfig::default().with_sim_time_limit(TimeValue::from_secs(5));
        let mut sim = simulation(
            config,
            move |ctx: &mut ActivityContext| {
                let me = ctx.component_id();
                let outcome = ctx.delete_component(me);
                let still_there = ctx.find_component("Net.worker")?.is_some();
                seen.lock().unwrap().push(format!(
                    "deferred {} registered {}",
                    matches!(outcome, Err(Interrupt::DeleteComponent(id)) if id == me),
                    still_there
                ));
                outcome
            },
            None,
        );
        let worker = sim.find_component("Net.worker").unwrap();
        let status = sim.run_until(RunLimit::until_event(1)).unwrap();
        assert_eq!(status, RunStatus::Paused);
        assert_eq!(log.lock().unwrap().as_slice(), &["deferred true registered true"]);
        // gone once the starter event handed control back
        assert!(sim.component(worker).is_none());
        assert!(sim.execution_context(worker).is_none());
        let termination = sim.run().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
    }
}
