use crate::core::components::component::Component;
use crate::core::components::params::ParamValue;
use crate::core::components::signals::{SignalListener, SignalValue};
use crate::core::errors::{Interrupt, SimError, SimResult, Termination};
use crate::core::event::Message;
use crate::core::execution::simulation::Simulation;
use crate::core::rng::Draw;
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId};

/// Kernel services available to component code.
///
/// Implemented for callbacks of simple modules (`ModuleContext`) and for
/// activity procedures (`ActivityContext`), so component logic reads the
/// same whichever way it is written.
pub trait SimContext {
    /// Component on whose behalf the calls are made
    fn component_id(&self) -> ComponentId;

    fn now(&self) -> TimeValue;

    /// Schedule `msg` to arrive back at this component at `time`
    fn schedule_at(&mut self, time: TimeValue, msg: Message) -> SimResult<EventId>;

    fn schedule_after(&mut self, delay: TimeValue, msg: Message) -> SimResult<EventId> {
        let at = self.now().checked_add(delay).ok_or_else(|| {
            Interrupt::Failed(SimError::runtime("scheduling time overflows the time range"))
        })?;
        self.schedule_at(at, msg)
    }

    /// Cancel a pending self-message; `None` if it is no longer pending
    fn cancel_event(&mut self, id: EventId) -> SimResult<Option<Message>>;

    fn send(&mut self, msg: Message, gate: &str) -> SimResult {
        self.send_via(msg, gate, None, TimeValue::ZERO)
    }

    /// Send through output gate `gate[index]`, leaving after `delay`
    fn send_via(
        &mut self,
        msg: Message,
        gate: &str,
        index: Option<u32>,
        delay: TimeValue,
    ) -> SimResult;

    /// Deliver straight to `target`, bypassing gates and channels
    fn send_direct(&mut self, msg: Message, target: ComponentId, delay: TimeValue) -> SimResult;

    fn emit(&mut self, signal: &str, value: SignalValue) -> SimResult;

    fn par(&mut self, name: &str) -> SimResult<ParamValue>;

    fn set_par(&mut self, name: &str, value: ParamValue) -> SimResult;

    /// Listen to `signal` (a name or pattern) on this component and below
    fn subscribe(&mut self, signal: &str, listener: Box<dyn SignalListener>) -> SimResult;

    fn draw(&mut self, draw: Draw) -> SimResult<f64>;

    /// Create a component of a registered type at run time. Submodules of
    /// compound types are built right away.
    fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        parent: Option<ComponentId>,
    ) -> SimResult<ComponentId>;

    /// Delete `id` and everything below it. Deleting the running component
    /// (or an ancestor of it) is deferred until control is back in the kernel.
    fn delete_component(&mut self, id: ComponentId) -> SimResult;

    /// Release `id`, owned by this component, into the unassigned pool.
    /// A dropped component survives the deletion of its former owner.
    fn drop_component(&mut self, id: ComponentId) -> SimResult;

    /// Become the owner of `id`
    fn take_component(&mut self, id: ComponentId) -> SimResult;

    fn find_component(&mut self, path: &str) -> SimResult<Option<ComponentId>>;

    /// Terminate the run as ended by the model
    fn end_simulation(&mut self) -> SimResult {
        Err(Termination::ended_by_model().into())
    }

    /// Delete the calling component once control is back in the kernel
    fn delete_self(&mut self) -> SimResult {
        Err(Interrupt::DeleteComponent(self.component_id()))
    }
}

/// Context handed to the callbacks of a simple module
pub struct ModuleContext<'a> {
    sim: &'a mut Simulation,
    component: ComponentId,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, component: ComponentId) -> Self {
        Self { sim, component }
    }

    pub fn simulation(&self) -> &Simulation {
        self.sim
    }

    pub fn component(&self) -> Option<&Component> {
        self.sim.component(self.component)
    }

    pub fn full_path(&self) -> String {
        self.sim.full_path(self.component).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.sim.registry().parent(self.component)
    }

    pub fn gate_size(&self, name: &str) -> usize {
        self.component().map_or(0, |c| c.gate_size(name))
    }
}

impl SimContext for ModuleContext<'_> {
    fn component_id(&self) -> ComponentId {
        self.component
    }

    fn now(&self) -> TimeValue {
        self.sim.now()
    }

    fn schedule_at(&mut self, time: TimeValue, msg: Message) -> SimResult<EventId> {
        Ok(self.sim.op_schedule_at(self.component, time, msg)?)
    }

    fn cancel_event(&mut self, id: EventId) -> SimResult<Option<Message>> {
        Ok(self.sim.op_cancel(self.component, id)?)
    }

    fn send_via(
        &mut self,
        msg: Message,
        gate: &str,
        index: Option<u32>,
        delay: TimeValue,
    ) -> SimResult {
        Ok(self.sim.op_send(self.component, msg, gate, index, delay)?)
    }

    fn send_direct(&mut self, msg: Message, target: ComponentId, delay: TimeValue) -> SimResult {
        Ok(self.sim.op_send_direct(self.component, msg, target, delay)?)
    }

    fn emit(&mut self, signal: &str, value: SignalValue) -> SimResult {
        Ok(self.sim.op_emit(self.component, signal, value)?)
    }

    fn par(&mut self, name: &str) -> SimResult<ParamValue> {
        Ok(self.sim.op_par(self.component, name)?)
    }

    fn set_par(&mut self, name: &str, value: ParamValue) -> SimResult {
        Ok(self.sim.op_set_par(self.component, name, value)?)
    }

    fn subscribe(&mut self, signal: &str, listener: Box<dyn SignalListener>) -> SimResult {
        Ok(self.sim.subscribe(self.component, signal, listener)?)
    }

    fn draw(&mut self, draw: Draw) -> SimResult<f64> {
        Ok(self.sim.op_draw(self.component, draw)?)
    }

    fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        parent: Option<ComponentId>,
    ) -> SimResult<ComponentId> {
        Ok(self.sim.create_component(type_name, name, parent)?)
    }

    fn delete_component(&mut self, id: ComponentId) -> SimResult {
        self.sim.delete_component(id)
    }

    fn drop_component(&mut self, id: ComponentId) -> SimResult {
        Ok(self.sim.drop_component(self.component, id)?)
    }

    fn take_component(&mut self, id: ComponentId) -> SimResult {
        Ok(self.sim.take_component(self.component, id)?)
    }

    fn find_component(&mut self, path: &str) -> SimResult<Option<ComponentId>> {
        Ok(self.sim.find_component(path))
    }
}
