//! Kernel services offered to components, and delivery of messages to them.

use crate::core::components::component::{BehaviorSlot, Component, ComponentKind, Module};
use crate::core::components::context::ModuleContext;
use crate::core::components::gates::GateDirection;
use crate::core::components::ownership::{check_take, Owner};
use crate::core::components::params::ParamValue;
use crate::core::components::signals::{SignalListener, SignalValue};
use crate::core::errors::{Interrupt, SimError, SimResult};
use crate::core::event::{Event, Message};
use crate::core::execution::coroutine::{ExecutionContext, Reply, Request};
use crate::core::execution::simulation::Simulation;
use crate::core::pattern::PathPattern;
use crate::core::rng::Draw;
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId, GateRef};
use log::{debug, trace};

fn later(t: TimeValue, delay: TimeValue) -> Result<TimeValue, SimError> {
    t.checked_add(delay)
        .ok_or_else(|| SimError::runtime(format!("simulation time overflow: t={} + {}", t, delay)))
}

impl Simulation {
    /// Schedule `msg` back to `component` at `time`
    pub(crate) fn op_schedule_at(
        &mut self,
        component: ComponentId,
        time: TimeValue,
        mut msg: Message,
    ) -> Result<EventId, SimError> {
        if time < self.now {
            return Err(SimError::runtime(format!(
                "scheduleAt(): cannot schedule message '{}' to the past, t={} < simTime={}",
                msg.name(),
                time,
                self.now
            )));
        }
        self.take_message(component, &msg)?;
        msg.sender = Some(component);
        msg.sender_gate = None;
        msg.arrival_component = Some(component);
        msg.arrival_gate = None;
        msg.sending_time = self.now;
        msg.arrival_time = time;
        msg.self_message = true;
        msg.owner = Owner::FutureEvents;
        self.env.message_scheduled(&msg);
        let id = self.ids.next_event_id()?;
        self.fes.insert(Event::message(id, msg));
        Ok(id)
    }

    /// Take back a self-message of `component` before it fires.
    /// `None` if the event already happened or was cancelled.
    pub(crate) fn op_cancel(
        &mut self,
        component: ComponentId,
        id: EventId,
    ) -> Result<Option<Message>, SimError> {
        let event = match self.fes.remove(id) {
            Some(ev) => ev,
            None => return Ok(None),
        };
        let mine = matches!(
            event.as_message(),
            Some(m) if m.is_self_message() && m.arrival_component() == Some(component)
        );
        if !mine {
            let name = event.name().to_string();
            self.fes.put_back(event);
            return Err(SimError::Ownership(format!(
                "cancel_event(): '{}' ({}) is not a self-message of {}",
                name, id, component
            )));
        }
        Ok(event.into_message().map(|mut msg| {
            msg.owner = Owner::Component(component);
            self.env.message_cancelled(&msg);
            msg
        }))
    }

    fn take_message(&self, component: ComponentId, msg: &Message) -> Result<(), SimError> {
        check_take(
            msg.owner(),
            Owner::Component(component),
            self.config.allow_object_stealing,
            &format!("message '{}'", msg.name()),
        )
    }

    /// Send `msg` out through an output gate of `component`. The message
    /// follows the connection chain, picking up channel delays, to the
    /// gate where the chain ends.
    pub(crate) fn op_send(
        &mut self,
        component: ComponentId,
        mut msg: Message,
        gate: &str,
        index: Option<u32>,
        delay: TimeValue,
    ) -> Result<(), SimError> {
        if delay < TimeValue::ZERO {
            return Err(SimError::runtime(format!(
                "send(): negative delay {} for message '{}'",
                delay,
                msg.name()
            )));
        }
        let source = self.registry.get(component)?;
        let gate_index = source.find_gate(gate, index).ok_or_else(|| {
            SimError::Gate(format!("'{}' has no gate '{}'", source.full_name(), gate))
        })?;
        if source.gates[gate_index].direction() != GateDirection::Output {
            return Err(SimError::Gate(format!(
                "send(): gate '{}' of '{}' is not an output gate",
                source.gates[gate_index].full_name(),
                source.full_name()
            )));
        }
        self.take_message(component, &msg)?;
        msg.sender = Some(component);
        msg.sender_gate = Some(gate_index);
        msg.sending_time = self.now;
        msg.self_message = false;
        self.env.begin_send(&msg);

        let start = GateRef {
            component,
            gate: gate_index,
        };
        let mut at = start;
        let mut arrival = later(self.now, delay)?;
        loop {
            let g = &self.registry.get(at.component)?.gates[at.gate];
            let (next, channel) = (g.next(), g.channel());
            if let Some(ch) = channel {
                match self.process_channel(ch, &msg)? {
                    Some(extra) => arrival = later(arrival, extra)?,
                    None => {
                        debug!("message '{}' discarded by channel {}", msg.name(), ch);
                        return Ok(());
                    }
                }
            }
            match next {
                Some(n) => at = n,
                None => break,
            }
        }
        if at == start {
            return Err(SimError::Gate(format!(
                "send(): gate '{}' of '{}' is not connected",
                gate,
                self.registry.full_path(component).unwrap_or_default()
            )));
        }
        self.dispatch(msg, at.component, Some(at.gate), arrival)
    }

    /// Run the channel's behavior; `None` means the message is dropped
    fn process_channel(
        &mut self,
        channel: ComponentId,
        msg: &Message,
    ) -> Result<Option<TimeValue>, SimError> {
        let now = self.now;
        let Component { behavior, params, .. } = self.registry.get_mut(channel)?;
        match behavior {
            BehaviorSlot::Channel(Some(ch)) => {
                let outcome = ch.process_message(msg, params, now)?;
                Ok((!outcome.discard).then_some(outcome.delay))
            }
            _ => Err(SimError::internal(format!("{} is not a channel", channel))),
        }
    }

    /// Send `msg` straight to `target`, bypassing gates
    pub(crate) fn op_send_direct(
        &mut self,
        component: ComponentId,
        mut msg: Message,
        target: ComponentId,
        delay: TimeValue,
    ) -> Result<(), SimError> {
        if delay < TimeValue::ZERO {
            return Err(SimError::runtime(format!(
                "send_direct(): negative delay {} for message '{}'",
                delay,
                msg.name()
            )));
        }
        self.take_message(component, &msg)?;
        msg.sender = Some(component);
        msg.sender_gate = None;
        msg.sending_time = self.now;
        msg.self_message = false;
        self.env.begin_send(&msg);
        let arrival = later(self.now, delay)?;
        self.dispatch(msg, target, None, arrival)
    }

    /// Final leg of a send: into the local event set, or across to the
    /// partition hosting the target
    fn dispatch(
        &mut self,
        mut msg: Message,
        target: ComponentId,
        gate: Option<usize>,
        arrival: TimeValue,
    ) -> Result<(), SimError> {
        let dest = self.registry.get(target)?;
        let remote = match dest.kind() {
            ComponentKind::Simple | ComponentKind::Activity => None,
            ComponentKind::Placeholder => dest.remote_partition(),
            kind => {
                return Err(SimError::Gate(format!(
                    "message '{}' cannot be delivered to {:?} component '{}'",
                    msg.name(),
                    kind,
                    dest.full_name()
                )))
            }
        };
        msg.arrival_component = Some(target);
        msg.arrival_gate = gate;
        msg.arrival_time = arrival;
        if let Some(p) = remote {
            let now = self.now;
            let partition = self.partition.as_mut().ok_or_else(|| {
                SimError::internal(format!("placeholder {} without a partition", target))
            })?;
            trace!("message '{}' to partition {} for t={}", msg.name(), p, arrival);
            return partition.send_remote(&msg, p, now);
        }
        msg.owner = Owner::FutureEvents;
        self.env.message_scheduled(&msg);
        let id = self.ids.next_event_id()?;
        self.fes.insert(Event::message(id, msg));
        Ok(())
    }

    /// Emit a signal on `component`. Listeners on the component and on
    /// every ancestor whose pattern matches the signal name are called,
    /// nearest first.
    pub(crate) fn op_emit(
        &mut self,
        component: ComponentId,
        signal: &str,
        value: SignalValue,
    ) -> Result<(), SimError> {
        let source = self.registry.get(component)?;
        if self.config.check_signals {
            source
                .component_type()
                .check_signal(signal, &value)
                .map_err(|e| e.in_component(&source.full_name()))?;
        }
        self.env.signal_emitted(component, signal, &value);
        let now = self.now;
        let mut cur = Some(component);
        while let Some(id) = cur {
            if let Some(c) = self.registry.by_id_mut(id) {
                for (pattern, listener) in c.listeners.iter_mut() {
                    if pattern.matches(signal) {
                        listener.receive_signal(component, signal, &value, now);
                    }
                }
            }
            cur = self.registry.parent(id);
        }
        Ok(())
    }

    pub(crate) fn op_par(&self, component: ComponentId, name: &str) -> Result<ParamValue, SimError> {
        let c = self.registry.get(component)?;
        c.params
            .value(name)
            .cloned()
            .map_err(|e| e.in_component(&c.full_name()))
    }

    pub(crate) fn op_set_par(
        &mut self,
        component: ComponentId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), SimError> {
        let check = self.config.param_mutability_check;
        let c = self.registry.get_mut(component)?;
        let mutable = c
            .params
            .get(name)
            .map(|p| p.is_mutable())
            .ok_or_else(|| SimError::Parameter(format!("no such parameter: '{}'", name)))?;
        if check && c.initialized && !mutable {
            return Err(SimError::Parameter(format!(
                "parameter '{}' of '{}' is not mutable",
                name,
                c.full_name()
            )));
        }
        c.params.set(name, value)
    }

    pub(crate) fn op_draw(&mut self, component: ComponentId, draw: Draw) -> Result<f64, SimError> {
        self.registry.get_mut(component)?.rng.draw(draw)
    }

    /// Register `listener` on `component` for signals whose name matches
    /// the `signal` pattern
    pub fn subscribe(
        &mut self,
        component: ComponentId,
        signal: &str,
        listener: Box<dyn SignalListener>,
    ) -> Result<(), SimError> {
        self.registry
            .get_mut(component)?
            .listeners
            .push((PathPattern::new(signal), listener));
        Ok(())
    }

    /// Schedule `msg` for delivery to `target` at `at`, as if sent by the
    /// kernel. Meant for drivers and tests injecting traffic.
    pub fn schedule_message(
        &mut self,
        target: ComponentId,
        at: TimeValue,
        mut msg: Message,
    ) -> Result<EventId, SimError> {
        if at < self.now {
            return Err(SimError::runtime(format!(
                "cannot schedule message '{}' to the past, t={} < simTime={}",
                msg.name(),
                at,
                self.now
            )));
        }
        self.registry.get(target)?;
        msg.sender = None;
        msg.sending_time = self.now;
        msg.arrival_component = Some(target);
        msg.arrival_time = at;
        msg.owner = Owner::FutureEvents;
        let id = self.ids.next_event_id()?;
        self.fes.insert(Event::message(id, msg));
        Ok(id)
    }

    /// Hand a message to its arrival component
    pub(crate) fn deliver(&mut self, mut msg: Message) -> SimResult {
        let target = match msg.arrival_component() {
            Some(t) => t,
            None => return Err(SimError::internal(format!("message '{}' has no destination", msg.name())).into()),
        };
        let kind = match self.registry.by_id(target) {
            Some(c) => c.kind(),
            None => {
                debug!("message '{}' for deleted component {} discarded", msg.name(), target);
                return Ok(());
            }
        };
        msg.owner = Owner::Component(target);
        match kind {
            ComponentKind::Simple => self.call_module(target, |m, ctx| m.handle_message(ctx, msg)),
            ComponentKind::Activity => self.resume_activity(target, msg),
            other => Err(SimError::internal(format!(
                "message '{}' delivered to {:?} component {}",
                msg.name(),
                other,
                target
            ))
            .into()),
        }
    }

    /// Run `f` on the module of a simple component. The module is taken out
    /// of the registry for the duration of the call, so the callback gets
    /// the whole simulation through its context.
    pub(crate) fn call_module<F>(&mut self, id: ComponentId, f: F) -> SimResult
    where
        F: FnOnce(&mut dyn Module, &mut ModuleContext<'_>) -> SimResult,
    {
        let taken = match self.registry.by_id_mut(id).map(|c| &mut c.behavior) {
            Some(BehaviorSlot::Simple(slot)) => slot.take(),
            _ => return Ok(()),
        };
        let mut module = taken.ok_or_else(|| {
            SimError::internal(format!("{} re-entered while executing", id))
        })?;
        self.executing.push(id);
        let result = {
            let mut ctx = ModuleContext::new(self, id);
            f(module.as_mut(), &mut ctx)
        };
        self.executing.pop();
        if let Some(BehaviorSlot::Simple(slot)) = self.registry.by_id_mut(id).map(|c| &mut c.behavior) {
            *slot = Some(module);
        }
        self.with_component_path(id, result)
    }

    /// Attach the component path to errors raised in its code
    fn with_component_path(&self, id: ComponentId, result: SimResult) -> SimResult {
        result.map_err(|i| match i {
            Interrupt::Failed(e) => {
                Interrupt::Failed(e.in_component(&self.registry.full_path(id).unwrap_or_default()))
            }
            other => other,
        })
    }

    /// Create the execution context of an activity and run its procedure
    /// up to the first suspension
    pub(crate) fn start_activity(&mut self, component: ComponentId) -> SimResult {
        let body = match self.registry.by_id_mut(component).map(|c| &mut c.behavior) {
            Some(BehaviorSlot::Activity(slot)) => slot.take(),
            _ => return Ok(()),
        };
        let body = body.ok_or_else(|| {
            SimError::internal(format!("activity {} started twice", component))
        })?;
        let path = self.registry.full_path(component).unwrap_or_default();
        let mut ctx = ExecutionContext::spawn(component, &path, body, self.config.activity_stack_size)?;
        debug!("starting activity '{}'", path);
        let now = self.now;
        self.executing.push(component);
        let result = ctx.start(now, |req| self.serve_request(component, req));
        self.executing.pop();
        self.keep_context(component, ctx);
        self.with_component_path(component, result)
    }

    fn resume_activity(&mut self, component: ComponentId, msg: Message) -> SimResult {
        let mut ctx = match self.contexts.remove(&component) {
            Some(ctx) => ctx,
            None => {
                return Err(SimError::runtime(format!(
                    "message '{}' arrived at activity that has already terminated",
                    msg.name()
                ))
                .in_component(&self.registry.full_path(component).unwrap_or_default())
                .into())
            }
        };
        self.executing.push(component);
        let result = ctx.resume(msg, |req| self.serve_request(component, req));
        self.executing.pop();
        self.keep_context(component, ctx);
        self.with_component_path(component, result)
    }

    fn keep_context(&mut self, component: ComponentId, ctx: ExecutionContext) {
        if ctx.is_alive() && self.registry.contains(component) {
            self.contexts.insert(component, ctx);
        } else {
            trace!("execution context of {} ended ({:?})", component, ctx.state());
        }
    }

    /// Carry out a request made by a running activity
    pub(crate) fn serve_request(&mut self, component: ComponentId, req: Request) -> SimResult<Reply> {
        Ok(match req {
            Request::ScheduleAt { time, msg } => {
                Reply::EventId(self.op_schedule_at(component, time, msg)?)
            }
            Request::Cancel(id) => Reply::Cancelled(self.op_cancel(component, id)?),
            Request::Send {
                msg,
                gate,
                index,
                delay,
            } => {
                self.op_send(component, msg, &gate, index, delay)?;
                Reply::Done
            }
            Request::SendDirect { msg, target, delay } => {
                self.op_send_direct(component, msg, target, delay)?;
                Reply::Done
            }
            Request::Emit { signal, value } => {
                self.op_emit(component, &signal, value)?;
                Reply::Done
            }
            Request::Par(name) => Reply::Param(self.op_par(component, &name)?),
            Request::SetPar { name, value } => {
                self.op_set_par(component, &name, value)?;
                Reply::Done
            }
            Request::Subscribe { signal, listener } => {
                self.subscribe(component, &signal, listener)?;
                Reply::Done
            }
            Request::Draw(draw) => Reply::Number(self.op_draw(component, draw)?),
            Request::Create {
                type_name,
                name,
                parent,
            } => Reply::Component(Some(self.create_component(&type_name, &name, parent)?)),
            Request::Delete(id) => {
                self.delete_component(id)?;
                Reply::Done
            }
            Request::Drop(id) => {
                self.drop_component(component, id)?;
                Reply::Done
            }
            Request::Take(id) => {
                self.take_component(component, id)?;
                Reply::Done
            }
            Request::Find(path) => Reply::Component(self.find_component(&path)),
        })
    }
}
