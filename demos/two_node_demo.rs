use simkern::core::components::SignalListener;
use simkern::core::execution::ActivityContext;
use simkern::core::rng::Draw;
use simkern::{
    run_simulation, ChannelSpec, ComponentId, ComponentType, GateDecl, KernelConfig, Message,
    Module, ModuleContext, ParamDecl, ParamType, ParamValue, SignalDecl, SignalType, SignalValue,
    SimContext, SimResult, Simulation, TimeValue, TypeRegistry,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Generates jobs with exponential inter-arrival times
struct Generator {
    sent: u64,
}

impl Module for Generator {
    fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
        ctx.schedule_at(TimeValue::ZERO, Message::new("next-job"))?;
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, msg: Message) -> SimResult {
        self.sent += 1;
        let job = Message::new(format!("job-{}", self.sent)).with_payload(ctx.now());
        ctx.send(job, "out")?;
        let mean = ctx.par("interarrival")?.as_double()?;
        let gap = TimeValue::from_secs_f64(ctx.draw(Draw::Exponential { mean })?)?;
        ctx.schedule_after(gap, msg)?;
        Ok(())
    }

    fn finish(&mut self, ctx: &mut ModuleContext<'_>) -> SimResult {
        println!("{}: generated {} jobs", ctx.full_path(), self.sent);
        Ok(())
    }
}

/// Single server written as an activity. Jobs arriving while it works
/// are queued.
fn serve(ctx: &mut ActivityContext) -> SimResult {
    let mean = ctx.par("service")?.as_double()?;
    let mut queue = VecDeque::new();
    loop {
        let mut job = match queue.pop_front() {
            Some(job) => job,
            None => ctx.receive()?,
        };
        let work = TimeValue::from_secs_f64(ctx.draw(Draw::Exponential { mean })?)?;
        let done = ctx.now() + work;
        while ctx.now() < done {
            match ctx.receive_timeout(done - ctx.now())? {
                Some(next) => queue.push_back(next),
                None => break,
            }
        }
        let created = job.take_payload::<TimeValue>().unwrap_or(TimeValue::ZERO);
        ctx.emit("sojourn", SignalValue::Time(ctx.now() - created))?;
    }
}

#[derive(Default)]
struct Stats {
    count: u64,
    total: f64,
    max: f64,
}

struct SojournStats(Arc<Mutex<Stats>>);

impl SignalListener for SojournStats {
    fn receive_signal(&mut self, _source: ComponentId, _signal: &str, value: &SignalValue, _at: TimeValue) {
        if let (SignalValue::Time(t), Ok(mut stats)) = (value, self.0.lock()) {
            let secs = t.as_secs_f64();
            stats.count += 1;
            stats.total += secs;
            stats.max = stats.max.max(secs);
        }
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    println!("Starting two node queueing demo");

    let mut reg = TypeRegistry::with_builtins();
    reg.register(
        ComponentType::simple("demo.Generator", || Generator { sent: 0 })
            .param(ParamDecl::new("interarrival", ParamType::Double).with_default(ParamValue::Double(1.0)))
            .gate(GateDecl::output("out")),
    )
    .map_err(|e| e.to_string())?;
    reg.register(
        ComponentType::activity("demo.Server", serve)
            .param(ParamDecl::new("service", ParamType::Double).with_default(ParamValue::Double(0.8)))
            .signal(SignalDecl::new("sojourn", SignalType::parse("simtime_t")))
            .gate(GateDecl::input("in")),
    )
    .map_err(|e| e.to_string())?;
    reg.register(
        ComponentType::compound("demo.Queueing", |b| {
            let gen = b.submodule("demo.Generator", "gen")?;
            let server = b.submodule("demo.Server", "server")?;
            b.connect_with(
                &gen.gate("out"),
                &server.gate("in"),
                ChannelSpec::delay(TimeValue::from_millis(10)),
            )
        })
        .network(),
    )
    .map_err(|e| e.to_string())?;

    let config = KernelConfig::default()
        .with_sim_time_limit(TimeValue::from_secs(1000))
        .with_seed(42);
    let mut sim = Simulation::new(config, Arc::new(reg)).map_err(|e| e.to_string())?;

    let stats = Arc::new(Mutex::new(Stats::default()));
    let root = sim.setup_network("demo.Queueing").map_err(|e| e.to_string())?;
    sim.subscribe(root, "sojourn", Box::new(SojournStats(stats.clone())))
        .map_err(|e| e.to_string())?;
    sim.call_initialize().map_err(|e| e.to_string())?;
    let termination = sim.run().map_err(|e| e.to_string())?;
    sim.call_finish().map_err(|e| e.to_string())?;

    println!("{}", termination);
    println!("events: {}, fingerprint: {}", sim.event_number(), sim.fingerprint());
    if let Ok(stats) = stats.lock() {
        if stats.count > 0 {
            println!(
                "jobs served: {}, mean sojourn: {:.3}s, max sojourn: {:.3}s",
                stats.count,
                stats.total / stats.count as f64,
                stats.max
            );
        }
    }
    sim.delete_network().map_err(|e| e.to_string())?;

    // the same run again, start to finish in one call
    let report = run_simulation(&mut sim, "demo.Queueing");
    println!(
        "rerun: {} events, fingerprint {}",
        report.events, report.fingerprint
    );
    Ok(())
}
