use simkern::core::execution::{run_partitions, ParsimConfig};
use simkern::{
    ChannelSpec, ComponentType, GateDecl, KernelConfig, Message, Module, ModuleContext, ParamDecl,
    ParamType, ParamValue, SimContext, SimResult, Simulation, TimeValue, TypeRegistry,
};
use std::sync::Arc;

const PARTITIONS: u32 = 3;

/// Ring node: forwards the token it receives, counting laps at node 0
struct RingNode {
    forwarded: u64,
}

impl Module for RingNode {
    fn initialize(&mut self, ctx: &mut ModuleContext<'_>, _stage: u32) -> SimResult {
        if ctx.par("starter")?.as_bool()? {
            ctx.send(Message::new("token").with_payload(0u64), "out")?;
        }
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut ModuleContext<'_>, mut msg: Message) -> SimResult {
        self.forwarded += 1;
        if ctx.par("starter")?.as_bool()? {
            let laps = msg.take_payload::<u64>().unwrap_or(0) + 1;
            log::info!("token completed lap {} at t={}", laps, ctx.now());
            msg.set_payload(laps);
        }
        ctx.send(msg, "out")
    }

    fn finish(&mut self, ctx: &mut ModuleContext<'_>) -> SimResult {
        println!("{}: forwarded {} tokens", ctx.full_path(), self.forwarded);
        Ok(())
    }
}

fn registry() -> Result<TypeRegistry, String> {
    let mut reg = TypeRegistry::with_builtins();
    reg.register(
        ComponentType::simple("demo.RingNode", || RingNode { forwarded: 0 })
            .param(ParamDecl::new("starter", ParamType::Bool).with_default(ParamValue::Bool(false)))
            .gate(GateDecl::input("in"))
            .gate(GateDecl::output("out")),
    )
    .map_err(|e| e.to_string())?;
    reg.register(
        ComponentType::compound("demo.Ring", |b| {
            let first = b.submodule_with("demo.RingNode", "node0", &[("starter", ParamValue::Bool(true))])?;
            let mut nodes = vec![first];
            for i in 1..PARTITIONS {
                nodes.push(b.submodule("demo.RingNode", &format!("node{}", i))?);
            }
            for (i, node) in nodes.iter().enumerate() {
                let next = nodes[(i + 1) % nodes.len()];
                b.connect_with(
                    &node.gate("out"),
                    &next.gate("in"),
                    ChannelSpec::delay(TimeValue::from_millis(100)),
                )?;
            }
            Ok(())
        })
        .network(),
    )
    .map_err(|e| e.to_string())?;
    Ok(reg)
}

fn main() -> Result<(), String> {
    env_logger::init();
    println!("Starting token ring across {} partitions", PARTITIONS);

    let types = Arc::new(registry()?);
    let reports = run_partitions(PARTITIONS, "demo.Ring", |rank, comm| {
        let mut parsim = ParsimConfig::new(rank, PARTITIONS, TimeValue::from_millis(100));
        for p in 0..PARTITIONS {
            parsim = parsim.assign(&format!("Ring.node{}", p), p);
        }
        let config = KernelConfig::default()
            .with_sim_time_limit(TimeValue::from_secs(30))
            .with_parsim(parsim);
        Simulation::new(config, types.clone())?.with_communications(Box::new(comm))
    });

    let mut failed = false;
    for (rank, report) in reports.iter().enumerate() {
        match (&report.termination, &report.error) {
            (Some(t), None) => println!(
                "partition {}: {} ({} events, fingerprint {})",
                rank, t, report.events, report.fingerprint
            ),
            (_, Some(e)) => {
                println!("partition {} failed: {}", rank, e);
                failed = true;
            }
            (None, None) => println!("partition {}: no outcome", rank),
        }
    }
    if failed {
        return Err("distributed run failed".to_string());
    }
    Ok(())
}
