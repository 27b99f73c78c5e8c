use simkern::core::execution::{run_partitions, ParsimConfig, RunReport};
use simkern::core::parsim::ChannelCommunications;
use simkern::{
    ChannelSpec, ComponentType, GateDecl, KernelConfig, Message, Module, ModuleContext, SimContext,
    SimError, SimResult, Simulation, TerminationReason, TimeValue, TypeRegistry,
};
use std::sync::{Arc, Mutex};

/// Sends one job out of `out` when its timer fires at t=1s
struct Source;

impl Module for Source {
    fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
        ctx.schedule_at(TimeValue::from_secs(1), Message::new("tick"))?;
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, _msg: Message) -> SimResult {
        ctx.send(Message::new("job").with_payload(42u32), "out")
    }
}

struct Sink(Arc<Mutex<Vec<(String, u32, TimeValue)>>>);

impl Module for Sink {
    fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, mut msg: Message) -> SimResult {
        let value = msg.take_payload::<u32>().unwrap_or(0);
        self.0
            .lock()
            .unwrap()
            .push((msg.name().to_string(), value, ctx.now()));
        Ok(())
    }
}

type Arrivals = Arc<Mutex<Vec<(String, u32, TimeValue)>>>;

fn registry(link_delay: TimeValue, arrivals: &Arrivals) -> Arc<TypeRegistry> {
    let mut reg = TypeRegistry::with_builtins();
    reg.register(ComponentType::simple("pp.Source", || Source).gate(GateDecl::output("out")))
        .unwrap();
    let log = arrivals.clone();
    reg.register(
        ComponentType::simple("pp.Sink", move || Sink(log.clone())).gate(GateDecl::input("in")),
    )
    .unwrap();
    reg.register(
        ComponentType::compound("pp.Link", move |b| {
            let src = b.submodule("pp.Source", "src")?;
            let dst = b.submodule("pp.Sink", "dst")?;
            b.connect_with(&src.gate("out"), &dst.gate("in"), ChannelSpec::delay(link_delay))
        })
        .network(),
    )
    .unwrap();
    Arc::new(reg)
}

fn run_split(link_delay: TimeValue, arrivals: &Arrivals) -> Vec<RunReport> {
    let types = registry(link_delay, arrivals);
    run_partitions(2, "pp.Link", |rank, comm: ChannelCommunications| {
        let parsim = ParsimConfig::new(rank, 2, TimeValue::from_secs(1))
            .assign("Link.src", 0)
            .assign("Link.dst", 1);
        let config = KernelConfig::default()
            .with_sim_time_limit(TimeValue::from_secs(10))
            .with_parsim(parsim);
        Simulation::new(config, types.clone())?.with_communications(Box::new(comm))
    })
}

#[test]
fn test_message_crosses_partitions() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arrivals: Arrivals = Arc::new(Mutex::new(Vec::new()));
    let reports = run_split(TimeValue::from_secs(2), &arrivals);
    assert_eq!(reports.len(), 2);
    for (rank, report) in reports.iter().enumerate() {
        assert!(report.is_success(), "partition {}: {:?}", rank, report.error);
        let termination = report.termination.as_ref().unwrap();
        assert_eq!(termination.reason, TerminationReason::SimTimeLimit);
        assert_eq!(report.sim_time, TimeValue::from_secs(10));
    }
    assert_eq!(
        arrivals.lock().unwrap().as_slice(),
        &[("job".to_string(), 42, TimeValue::from_secs(3))]
    );
}

#[test]
fn test_lookahead_violation_fails_both_partitions() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arrivals: Arrivals = Arc::new(Mutex::new(Vec::new()));
    let reports = run_split(TimeValue::ZERO, &arrivals);
    let sender = reports[0].error.as_ref().unwrap();
    assert!(matches!(sender.root_cause(), SimError::Comm(_)), "{}", sender);
    let peer = reports[1].error.as_ref().unwrap();
    assert!(peer.is_remote(), "{}", peer);
    assert!(arrivals.lock().unwrap().is_empty());
}

#[test]
fn test_partitioning_requires_communications() {
    let arrivals: Arrivals = Arc::new(Mutex::new(Vec::new()));
    let config = KernelConfig::default().with_parsim(ParsimConfig::new(0, 2, TimeValue::from_secs(1)));
    let mut sim = Simulation::new(config, registry(TimeValue::from_secs(2), &arrivals)).unwrap();
    assert!(matches!(sim.setup_network("pp.Link"), Err(SimError::Config(_))));
}
