//! Building, connecting and tearing down the component tree.

use crate::core::components::component::{BehaviorSlot, Component, ComponentKind};
use crate::core::components::component_type::{ComponentType, DELAY_CHANNEL};
use crate::core::components::gates::{Gate, GateDirection};
use crate::core::components::ownership::Owner;
use crate::core::components::params::{ParamImpl, ParamSet, ParamValue};
use crate::core::components::signals::{
    ModelChange, SignalValue, POST_MODEL_CHANGE, PRE_MODEL_CHANGE,
};
use crate::core::errors::{Interrupt, SimError, SimResult};
use crate::core::event::{Event, EventKind};
use crate::core::execution::simulation::{Simulation, Stage};
use crate::core::parsim::partition::Placement;
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId, GateAddr, GateRef};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Channel to put on a connection: a channel type plus parameter assignments
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    type_name: String,
    assignments: Vec<(String, ParamValue)>,
}

impl ChannelSpec {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            assignments: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: ParamValue) -> Self {
        self.assignments.push((name.to_string(), value));
        self
    }

    /// The built-in delay channel with the given propagation delay
    pub fn delay(delay: TimeValue) -> Self {
        Self::new(DELAY_CHANNEL).with_param("delay", ParamValue::Time(delay))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Handed to a compound type's build function while its inside is built
pub struct BuildContext<'a> {
    sim: &'a mut Simulation,
    parent: ComponentId,
}

impl<'a> BuildContext<'a> {
    /// The compound module being built
    pub fn parent(&self) -> ComponentId {
        self.parent
    }

    pub fn simulation(&self) -> &Simulation {
        self.sim
    }

    /// Parameter of the compound module being built
    pub fn par(&self, name: &str) -> Result<ParamValue, SimError> {
        self.sim.op_par(self.parent, name)
    }

    pub fn submodule(&mut self, type_name: &str, name: &str) -> Result<ComponentId, SimError> {
        self.submodule_with(type_name, name, &[])
    }

    /// Create a submodule with parameter assignments taking precedence over
    /// the environment and the declared defaults
    pub fn submodule_with(
        &mut self,
        type_name: &str,
        name: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<ComponentId, SimError> {
        let ty = self.sim.types.get(type_name)?;
        let assignments: Vec<(String, ParamValue)> = params
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect();
        self.sim
            .insert_component(ty, name, Some(self.parent), None, &assignments)
    }

    /// Create the submodule vector `name[0..size]`
    pub fn submodule_vector(
        &mut self,
        type_name: &str,
        name: &str,
        size: u32,
    ) -> Result<Vec<ComponentId>, SimError> {
        let ty = self.sim.types.get(type_name)?;
        (0..size)
            .map(|i| {
                self.sim
                    .insert_component(ty.clone(), name, Some(self.parent), Some(i), &[])
            })
            .collect()
    }

    pub fn parent_gate(&self, name: &str) -> GateAddr {
        self.parent.gate(name)
    }

    pub fn parent_gate_at(&self, name: &str, index: u32) -> GateAddr {
        self.parent.gate_at(name, index)
    }

    pub fn connect(&mut self, src: &GateAddr, dst: &GateAddr) -> Result<(), SimError> {
        self.sim.connect(src, dst, None)
    }

    pub fn connect_with(
        &mut self,
        src: &GateAddr,
        dst: &GateAddr,
        channel: ChannelSpec,
    ) -> Result<(), SimError> {
        self.sim.connect(src, dst, Some(channel))
    }
}

impl Simulation {
    /// Allocate, register and attach a component of type `ty`.
    ///
    /// Everything that can fail is checked before the component is
    /// registered, so a failed insertion leaves nothing behind.
    pub(crate) fn insert_component(
        &mut self,
        ty: Arc<ComponentType>,
        name: &str,
        parent: Option<ComponentId>,
        index: Option<u32>,
        assignments: &[(String, ParamValue)],
    ) -> Result<ComponentId, SimError> {
        if name.is_empty() || name.contains('.') {
            return Err(SimError::Registry(format!("invalid component name '{}'", name)));
        }
        let full_name = match index {
            Some(i) => format!("{}[{}]", name, i),
            None => name.to_string(),
        };
        let path = match parent {
            Some(p) => {
                let pc = self.registry.get(p)?;
                if ty.kind() != ComponentKind::Channel && pc.kind() != ComponentKind::Compound {
                    return Err(SimError::Registry(format!(
                        "cannot create '{}' inside {:?} component '{}'",
                        full_name,
                        pc.kind(),
                        pc.full_name()
                    )));
                }
                let clash = self
                    .registry
                    .children(p)
                    .iter()
                    .filter_map(|&c| self.registry.by_id(c))
                    .any(|c| c.full_name() == full_name);
                if clash {
                    return Err(SimError::Registry(format!(
                        "'{}' already has a child named '{}'",
                        pc.full_name(),
                        full_name
                    )));
                }
                let parent_path = self.registry.full_path(p).unwrap_or_default();
                format!("{}.{}", parent_path, full_name)
            }
            None => {
                if let Some(root) = self.registry.root() {
                    return Err(SimError::Registry(format!(
                        "cannot create '{}' as root: {} is already the root",
                        full_name, root
                    )));
                }
                if ty.kind() == ComponentKind::Channel {
                    return Err(SimError::Registry("a channel cannot be the root".to_string()));
                }
                full_name.clone()
            }
        };

        // compound modules exist in every partition, so ids stay aligned
        let placement = match (&self.partition, ty.kind()) {
            (Some(partition), ComponentKind::Simple | ComponentKind::Activity) => {
                partition.placement(&path, false)
            }
            _ => Placement::Local,
        };
        let behavior = match placement {
            Placement::Local => BehaviorSlot::from_behavior(ty.instantiate()?),
            Placement::Remote(partition) => BehaviorSlot::Placeholder { partition },
        };
        let params = self.resolve_params(&ty, &path, assignments)?;
        let gates = ty.gate_decls().iter().flat_map(|d| d.instantiate()).collect();

        if let Some(p) = parent {
            self.emit_model_change(
                p,
                PRE_MODEL_CHANGE,
                ModelChange::ComponentAdd {
                    parent,
                    name: full_name.clone(),
                },
            )?;
        }
        let seed = self.env.rng_seed(&path);
        let rng = self.rngs.stream_for(&path, seed);
        let owner = parent.map_or(Owner::Kernel, Owner::Component);
        let id = self.registry.register(owner, |id| Component {
            id,
            name: name.to_string(),
            index,
            ty: ty.clone(),
            params,
            gates,
            behavior,
            listeners: Vec::new(),
            initialized: false,
            finished: false,
            rng,
        })?;
        if parent.is_none() {
            if let Err(e) = self.registry.set_root(id) {
                self.registry.deregister(id);
                return Err(e);
            }
        }
        self.env.component_created(id, &path);
        match placement {
            Placement::Local => debug!("created {} '{}' ({})", id, path, ty.qualified_name()),
            Placement::Remote(p) => debug!("created {} '{}' as placeholder for partition {}", id, path, p),
        }
        if let Some(p) = parent {
            self.emit_model_change(p, POST_MODEL_CHANGE, ModelChange::ComponentAdded { component: id })?;
        }
        Ok(id)
    }

    /// Parameter values come from explicit assignments, then the
    /// environment, then the declared default
    fn resolve_params(
        &mut self,
        ty: &ComponentType,
        path: &str,
        assignments: &[(String, ParamValue)],
    ) -> Result<ParamSet, SimError> {
        if let Some((unknown, _)) = assignments
            .iter()
            .find(|(n, _)| !ty.param_decls().iter().any(|d| &d.name == n))
        {
            return Err(SimError::Parameter(format!(
                "type '{}' has no parameter '{}'",
                ty.qualified_name(),
                unknown
            )));
        }
        let mut params = ParamSet::new();
        for decl in ty.param_decls() {
            let value = assignments
                .iter()
                .find(|(n, _)| n == &decl.name)
                .map(|(_, v)| v.clone())
                .or_else(|| self.env.read_parameter(path, &decl.name))
                .or_else(|| decl.default.clone())
                .ok_or_else(|| {
                    SimError::Parameter(format!(
                        "no value for parameter '{}' of '{}'",
                        decl.name, path
                    ))
                })?
                .coerce(decl.ty)
                .map_err(|e| e.in_component(path))?;
            if self.config.share_parameters && !decl.mutable {
                params.push_shared(ty.intern_parameter(self.run_id(), &decl.name, &value, false)?);
            } else {
                params.push_own(ParamImpl::new(&decl.name, value, decl.mutable));
            }
        }
        Ok(params)
    }

    fn emit_model_change(
        &mut self,
        on: ComponentId,
        signal: &str,
        change: ModelChange,
    ) -> Result<(), SimError> {
        self.op_emit(on, signal, SignalValue::object(change))
    }

    /// Run the build function of a compound module, then build its compound
    /// submodules in creation order. Placeholders and simple modules have
    /// no inside.
    pub(crate) fn build_inside(&mut self, id: ComponentId) -> Result<(), SimError> {
        let component = self.registry.get(id)?;
        if component.kind() != ComponentKind::Compound {
            return Ok(());
        }
        let build = component.component_type().build_fn();
        let path = self.registry.full_path(id).unwrap_or_default();
        if let Some(build) = build {
            let mut ctx = BuildContext { sim: self, parent: id };
            build(&mut ctx).map_err(|e| e.in_component(&path))?;
        }
        for child in self.registry.children(id).to_vec() {
            self.build_inside(child)?;
        }
        Ok(())
    }

    fn resolve_gate(&self, addr: &GateAddr) -> Result<GateRef, SimError> {
        let component = self.registry.get(addr.component())?;
        let gate = component
            .find_gate(addr.name(), addr.index())
            .ok_or_else(|| {
                SimError::Gate(format!(
                    "'{}' has no gate {}",
                    component.full_name(),
                    addr
                ))
            })?;
        Ok(GateRef {
            component: addr.component(),
            gate,
        })
    }

    fn gate_mut(&mut self, gate: GateRef) -> Result<&mut Gate, SimError> {
        self.registry
            .get_mut(gate.component)?
            .gates
            .get_mut(gate.gate)
            .ok_or_else(|| SimError::internal(format!("stale gate reference {:?}", gate)))
    }

    /// Connect `src` to `dst`, optionally through a channel.
    ///
    /// Allowed are output to input between siblings, input to input from a
    /// compound module into one of its submodules, and output to output from
    /// a submodule up to its parent.
    pub fn connect(
        &mut self,
        src: &GateAddr,
        dst: &GateAddr,
        channel: Option<ChannelSpec>,
    ) -> Result<(), SimError> {
        let from = self.resolve_gate(src)?;
        let to = self.resolve_gate(dst)?;
        let (from_dir, from_next) = {
            let g = &self.registry.get(from.component)?.gates[from.gate];
            (g.direction(), g.next())
        };
        let (to_dir, to_prev) = {
            let g = &self.registry.get(to.component)?.gates[to.gate];
            (g.direction(), g.prev())
        };
        let src_parent = self.registry.parent(from.component);
        let dst_parent = self.registry.parent(to.component);
        let siblings = src_parent.is_some() && src_parent == dst_parent;
        let valid = match (from_dir, to_dir) {
            (GateDirection::Output, GateDirection::Input) => siblings,
            (GateDirection::Input, GateDirection::Input) => dst_parent == Some(from.component),
            (GateDirection::Output, GateDirection::Output) => src_parent == Some(to.component),
            (GateDirection::Input, GateDirection::Output) => false,
        };
        if !valid {
            return Err(SimError::Gate(format!(
                "cannot connect {} ({:?}) to {} ({:?})",
                src, from_dir, dst, to_dir
            )));
        }
        if from_next.is_some() {
            return Err(SimError::Gate(format!("gate {} is already connected", src)));
        }
        if to_prev.is_some() {
            return Err(SimError::Gate(format!("gate {} is already connected", dst)));
        }
        self.emit_model_change(
            from.component,
            PRE_MODEL_CHANGE,
            ModelChange::GateConnect {
                component: from.component,
                gate: from.gate,
            },
        )?;
        let channel_id = match channel {
            Some(spec) => {
                let ty = self.types.get(&spec.type_name)?;
                if ty.kind() != ComponentKind::Channel {
                    return Err(SimError::Gate(format!(
                        "type '{}' is not a channel type",
                        spec.type_name
                    )));
                }
                let gate_name = self.registry.get(from.component)?.gates[from.gate].full_name();
                let name = format!("{}-channel", gate_name);
                Some(self.insert_component(ty, &name, Some(from.component), None, &spec.assignments)?)
            }
            None => None,
        };
        {
            let g = self.gate_mut(from)?;
            g.next = Some(to);
            g.channel = channel_id;
        }
        self.gate_mut(to)?.prev = Some(from);
        debug!("connected {} -> {}", src, dst);
        self.emit_model_change(
            from.component,
            POST_MODEL_CHANGE,
            ModelChange::GateConnected {
                component: from.component,
                gate: from.gate,
            },
        )
    }

    /// Remove the connection leaving `src` and the channel on it
    pub fn disconnect(&mut self, src: &GateAddr) -> Result<(), SimError> {
        let from = self.resolve_gate(src)?;
        let gate = &self.registry.get(from.component)?.gates[from.gate];
        let (to, channel) = match gate.next() {
            Some(to) => (to, gate.channel()),
            None => return Err(SimError::Gate(format!("gate {} is not connected", src))),
        };
        self.emit_model_change(
            from.component,
            PRE_MODEL_CHANGE,
            ModelChange::GateDisconnect {
                component: from.component,
                gate: from.gate,
            },
        )?;
        {
            let g = self.gate_mut(from)?;
            g.next = None;
            g.channel = None;
        }
        self.gate_mut(to)?.prev = None;
        if let Some(ch) = channel {
            self.delete_subtree(ch)?;
        }
        debug!("disconnected {}", src);
        self.emit_model_change(
            from.component,
            POST_MODEL_CHANGE,
            ModelChange::GateDisconnected {
                component: from.component,
                gate: from.gate,
            },
        )
    }

    /// Create a component while the network exists. `parent` defaults to
    /// the network root. Once the simulation is past initialization the
    /// new subtree is initialized right away.
    pub fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        parent: Option<ComponentId>,
    ) -> Result<ComponentId, SimError> {
        let parent = parent.or(self.registry.root()).ok_or_else(|| {
            SimError::Stage("create_component(): there is no network to create into".to_string())
        })?;
        let ty = self.types.get(type_name)?;
        let id = self.insert_component(ty, name, Some(parent), None, &[])?;
        self.build_inside(id)?;
        if matches!(self.stage(), Stage::Initialize | Stage::Event) {
            self.initialize_subtree(id)?;
        }
        Ok(id)
    }

    /// Delete a component and everything below it. If the component, or
    /// one below it, has code on the call stack, the deletion is deferred
    /// until control is back in the kernel. `Interrupt::DeleteComponent`
    /// is returned when the caller itself is among the doomed.
    pub fn delete_component(&mut self, id: ComponentId) -> SimResult {
        if !self.registry.contains(id) {
            return Err(SimError::Registry(format!("no such component: {}", id)).into());
        }
        if self.registry.root() == Some(id) {
            return Err(SimError::Registry(
                "the network root can only be removed by delete_network()".to_string(),
            )
            .into());
        }
        if self.is_executing_within(id) {
            debug!("deletion of {} deferred: it is executing", id);
            self.pending_deletes.push(id);
            return match self.current() {
                Some(cur) if cur == id || self.registry.tree.is_ancestor(id, cur) => {
                    Err(Interrupt::DeleteComponent(id))
                }
                _ => Ok(()),
            };
        }
        Ok(self.delete_subtree(id)?)
    }

    /// Release `id` from `owner` into the unassigned pool. The component
    /// stays alive: it no longer goes down with its former owner and is
    /// deleted with the network unless taken again.
    pub fn drop_component(&mut self, owner: ComponentId, id: ComponentId) -> Result<(), SimError> {
        self.registry.get(id)?;
        self.registry.tree.drop_object(Owner::Component(owner), id)?;
        debug!("{} dropped {}", owner, id);
        Ok(())
    }

    /// Make `owner` the owner, and so the parent, of `id`
    pub fn take_component(&mut self, owner: ComponentId, id: ComponentId) -> Result<(), SimError> {
        if self.registry.root() == Some(id) {
            return Err(SimError::Ownership(
                "the network root is owned by the simulation".to_string(),
            ));
        }
        let taker = self.registry.get(owner)?;
        let taken = self.registry.get(id)?;
        if taken.kind() != ComponentKind::Channel && taker.kind() != ComponentKind::Compound {
            return Err(SimError::Ownership(format!(
                "{:?} component '{}' cannot own modules",
                taker.kind(),
                taker.full_name()
            )));
        }
        if self.registry.parent(id) != Some(owner) {
            let name = taken.full_name();
            let clash = self
                .registry
                .children(owner)
                .iter()
                .filter_map(|&c| self.registry.by_id(c))
                .any(|c| c.full_name() == name);
            if clash {
                return Err(SimError::Registry(format!(
                    "'{}' already has a child named '{}'",
                    taker.full_name(),
                    name
                )));
            }
        }
        self.registry.tree.take(Owner::Component(owner), id)?;
        debug!("{} took {}", owner, id);
        Ok(())
    }

    /// Remove `id` and its subtree right away: execution contexts, pending
    /// events for it, connections leaving the subtree and the components
    /// themselves, children first
    pub(crate) fn delete_subtree(&mut self, id: ComponentId) -> Result<(), SimError> {
        let full_name = self.registry.get(id)?.full_name();
        let parent = self.registry.parent(id);
        if let Some(p) = parent {
            self.emit_model_change(p, PRE_MODEL_CHANGE, ModelChange::ComponentDelete { component: id })?;
        }
        let order = self.registry.tree.subtree_post_order(id);
        let members: HashSet<ComponentId> = order.iter().copied().collect();
        let paths: Vec<String> = order
            .iter()
            .map(|&c| self.registry.full_path(c).unwrap_or_default())
            .collect();

        for c in &order {
            if let Some(mut ctx) = self.contexts.remove(c) {
                ctx.kill();
            }
        }

        let doomed: Vec<EventId> = self
            .fes
            .iter()
            .filter(|e| match e.kind() {
                EventKind::Message(m) => m.arrival_component().map_or(false, |t| members.contains(&t)),
                EventKind::ActivityStart(c) => members.contains(c),
                EventKind::EndSimulation => false,
            })
            .map(Event::id)
            .collect();
        for ev in doomed {
            self.fes.remove(ev);
        }

        let mut orphaned_channels = Vec::new();
        let mut dangling = Vec::new();
        for c in &order {
            if let Some(component) = self.registry.by_id(*c) {
                for g in component.gates() {
                    if let Some(next) = g.next().filter(|n| !members.contains(&n.component)) {
                        dangling.push((next, false));
                    }
                    if let Some(prev) = g.prev().filter(|p| !members.contains(&p.component)) {
                        dangling.push((prev, true));
                    }
                }
            }
        }
        for (gate, outgoing) in dangling {
            let g = self.gate_mut(gate)?;
            if outgoing {
                g.next = None;
                if let Some(ch) = g.channel.take() {
                    orphaned_channels.push(ch);
                }
            } else {
                g.prev = None;
            }
        }

        for (c, path) in order.iter().zip(&paths) {
            if self.registry.deregister(*c).is_some() {
                self.env.component_deleted(*c, path);
            }
        }
        for ch in orphaned_channels {
            let path = self.registry.full_path(ch).unwrap_or_default();
            if self.registry.deregister(ch).is_some() {
                self.env.component_deleted(ch, &path);
            }
        }
        debug!("deleted '{}' ({} components)", full_name, order.len());

        if let Some(p) = parent.filter(|&p| self.registry.contains(p)) {
            self.emit_model_change(
                p,
                POST_MODEL_CHANGE,
                ModelChange::ComponentDeleted {
                    component: id,
                    name: full_name,
                },
            )?;
        }
        Ok(())
    }
}
