use crate::core::components::component::{Behavior, Channel, ComponentKind, DelayChannel, Module};
use crate::core::components::gates::GateDecl;
use crate::core::components::params::{
    ParamDecl, ParamType, ParamValue, SharedParam, SharedParamCache,
};
use crate::core::components::signals::{is_reserved_signal, SignalDecl, SignalType, SignalValue};
use crate::core::errors::{SimError, SimResult};
use crate::core::execution::coroutine::ActivityContext;
use crate::core::execution::network::BuildContext;
use crate::core::execution::simulation::Simulation;
use crate::core::time::TimeValue;
use crate::core::types::ComponentId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};
use uuid::Uuid;

pub type BehaviorFactory = Arc<dyn Fn() -> Behavior + Send + Sync>;
pub type BuildFn = Arc<dyn Fn(&mut BuildContext<'_>) -> Result<(), SimError> + Send + Sync>;
type ActivityBody = Arc<dyn Fn(&mut ActivityContext) -> SimResult + Send + Sync>;

/// Qualified name of the built-in delay channel type
pub const DELAY_CHANNEL: &str = "simkern.DelayChannel";

/// Descriptor of a module or channel type.
///
/// Types are immutable after registration and shared between simulation
/// instances, possibly on different threads. The mutable per-type caches
/// are mutex-protected; shared parameters are additionally kept apart per
/// run so that tearing down one run never disturbs another.
pub struct ComponentType {
    qualified_name: String,
    kind: ComponentKind,
    network: bool,
    params: Vec<ParamDecl>,
    gates: Vec<GateDecl>,
    signals: Vec<SignalDecl>,
    factory: Option<BehaviorFactory>,
    build: Option<BuildFn>,
    shared_params: Mutex<HashMap<Uuid, SharedParamCache>>,
    signals_seen: Mutex<HashMap<String, Option<SignalType>>>,
    available: OnceLock<bool>,
}

impl ComponentType {
    fn with_factory(
        qualified_name: &str,
        kind: ComponentKind,
        factory: Option<BehaviorFactory>,
    ) -> Self {
        Self {
            qualified_name: qualified_name.to_string(),
            kind,
            network: false,
            params: Vec::new(),
            gates: Vec::new(),
            signals: Vec::new(),
            factory,
            build: None,
            shared_params: Mutex::new(HashMap::new()),
            signals_seen: Mutex::new(HashMap::new()),
            available: OnceLock::new(),
        }
    }

    /// Simple module type driven by event callbacks
    pub fn simple<F, M>(qualified_name: &str, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module + 'static,
    {
        let factory: BehaviorFactory = Arc::new(move || Behavior::Simple(Box::new(factory())));
        Self::with_factory(qualified_name, ComponentKind::Simple, Some(factory))
    }

    /// Simple module type whose behavior is a sequential procedure
    pub fn activity<F>(qualified_name: &str, body: F) -> Self
    where
        F: Fn(&mut ActivityContext) -> SimResult + Send + Sync + 'static,
    {
        let body: ActivityBody = Arc::new(body);
        let factory: BehaviorFactory = Arc::new(move || {
            let body = body.clone();
            Behavior::Activity(Box::new(move |ctx: &mut ActivityContext| body(ctx)))
        });
        Self::with_factory(qualified_name, ComponentKind::Activity, Some(factory))
    }

    /// Compound module type; `build` creates its submodules and connections
    pub fn compound<F>(qualified_name: &str, build: F) -> Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<(), SimError> + Send + Sync + 'static,
    {
        let factory: BehaviorFactory = Arc::new(|| Behavior::Compound);
        let mut ty = Self::with_factory(qualified_name, ComponentKind::Compound, Some(factory));
        ty.build = Some(Arc::new(build));
        ty
    }

    pub fn channel<F, C>(qualified_name: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Channel + 'static,
    {
        let factory: BehaviorFactory = Arc::new(move || Behavior::Channel(Box::new(factory())));
        Self::with_factory(qualified_name, ComponentKind::Channel, Some(factory))
    }

    /// Type known by name only; instantiating it fails
    pub fn declared(qualified_name: &str, kind: ComponentKind) -> Self {
        Self::with_factory(qualified_name, kind, None)
    }

    /// Channel with `delay` and `disabled` parameters
    pub fn delay_channel() -> Self {
        Self::channel(DELAY_CHANNEL, || DelayChannel)
            .param(ParamDecl::new("delay", ParamType::Time).with_default(ParamValue::Time(TimeValue::ZERO)))
            .param(ParamDecl::new("disabled", ParamType::Bool).with_default(ParamValue::Bool(false)))
    }

    /// Mark the type as usable as a top-level network
    pub fn network(mut self) -> Self {
        self.network = true;
        self
    }

    pub fn param(mut self, decl: ParamDecl) -> Self {
        self.params.push(decl);
        self
    }

    pub fn gate(mut self, decl: GateDecl) -> Self {
        self.gates.push(decl);
        self
    }

    pub fn signal(mut self, decl: SignalDecl) -> Self {
        self.signals.push(decl);
        self
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Last segment of the qualified name
    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn is_network(&self) -> bool {
        self.network
    }

    pub fn param_decls(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn gate_decls(&self) -> &[GateDecl] {
        &self.gates
    }

    pub fn signal_decls(&self) -> &[SignalDecl] {
        &self.signals
    }

    pub(crate) fn build_fn(&self) -> Option<BuildFn> {
        self.build.clone()
    }

    /// Whether the implementation exists and produces the declared kind.
    /// Probed once, then cached.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| match &self.factory {
            Some(f) => f().kind() == self.kind,
            None => false,
        })
    }

    /// Produce a fresh behavior instance
    pub fn instantiate(&self) -> Result<Behavior, SimError> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            SimError::Registry(format!(
                "implementation for type '{}' is not available",
                self.qualified_name
            ))
        })?;
        let behavior = factory();
        if behavior.kind() != self.kind {
            return Err(SimError::Registry(format!(
                "implementation of '{}' produced a {:?} component, {:?} expected",
                self.qualified_name,
                behavior.kind(),
                self.kind
            )));
        }
        Ok(behavior)
    }

    /// Allocate, name, register and attach an instance under `parent`.
    /// Submodules of compound types are not built; see `Simulation::build_inside`.
    pub fn create(
        self: &Arc<Self>,
        sim: &mut Simulation,
        name: &str,
        parent: Option<ComponentId>,
        index: Option<u32>,
    ) -> Result<ComponentId, SimError> {
        sim.insert_component(self.clone(), name, parent, index, &[])
    }

    pub fn intern_parameter(
        &self,
        run: Uuid,
        name: &str,
        value: &ParamValue,
        mutable: bool,
    ) -> Result<SharedParam, SimError> {
        let mut caches = self.lock_shared()?;
        Ok(caches.entry(run).or_default().get_or_intern(name, value, mutable))
    }

    pub fn shared_parameter(&self, run: Uuid, key: &str) -> Option<SharedParam> {
        self.shared_params
            .lock()
            .ok()
            .and_then(|caches| caches.get(&run).and_then(|c| c.get_by_key(key)))
    }

    pub fn put_shared_parameter(
        &self,
        run: Uuid,
        key: &str,
        param: SharedParam,
    ) -> Result<(), SimError> {
        let mut caches = self.lock_shared()?;
        caches.entry(run).or_default().put_by_key(key, param)
    }

    pub fn shared_param_count(&self, run: Uuid) -> usize {
        self.shared_params
            .lock()
            .map(|caches| caches.get(&run).map_or(0, SharedParamCache::len))
            .unwrap_or(0)
    }

    /// Drop the shared parameters of one run
    pub fn clear_shared_params(&self, run: Uuid) {
        if let Ok(mut caches) = self.shared_params.lock() {
            caches.remove(&run);
        }
    }

    fn lock_shared(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, SharedParamCache>>, SimError> {
        self.shared_params.lock().map_err(|_| {
            SimError::internal(format!(
                "shared parameter cache of '{}' is poisoned",
                self.qualified_name
            ))
        })
    }

    fn find_signal_decl(&self, signal: &str) -> Option<&SignalDecl> {
        self.signals
            .iter()
            .find(|d| !d.is_wildcard() && d.matches(signal))
            .or_else(|| self.signals.iter().find(|d| d.is_wildcard() && d.matches(signal)))
    }

    /// Validate an emitted value against the signal declarations of this type
    pub fn check_signal(&self, signal: &str, value: &SignalValue) -> Result<(), SimError> {
        if is_reserved_signal(signal) {
            return Ok(());
        }
        let declared = {
            let mut seen = self
                .signals_seen
                .lock()
                .map_err(|_| SimError::internal("signal cache is poisoned"))?;
            seen.entry(signal.to_string())
                .or_insert_with(|| self.find_signal_decl(signal).map(|d| d.signal_type().clone()))
                .clone()
        };
        match declared {
            Some(ty) => ty.check(signal, value),
            None => Err(SimError::Signal(format!(
                "Undeclared signal '{}' emitted by a component of type '{}'",
                signal, self.qualified_name
            ))),
        }
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("qualified_name", &self.qualified_name)
            .field("kind", &self.kind)
            .field("network", &self.network)
            .finish()
    }
}

/// Lookup of component types by qualified name
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<ComponentType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in channel types
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.types
            .insert(DELAY_CHANNEL.to_string(), Arc::new(ComponentType::delay_channel()));
        reg
    }

    pub fn register(&mut self, ty: ComponentType) -> Result<Arc<ComponentType>, SimError> {
        if self.types.contains_key(ty.qualified_name()) {
            return Err(SimError::Registry(format!(
                "type '{}' is already registered",
                ty.qualified_name()
            )));
        }
        let ty = Arc::new(ty);
        self.types.insert(ty.qualified_name().to_string(), ty.clone());
        Ok(ty)
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<Arc<ComponentType>> {
        self.types.get(qualified_name).cloned()
    }

    pub fn get(&self, qualified_name: &str) -> Result<Arc<ComponentType>, SimError> {
        self.lookup(qualified_name)
            .ok_or_else(|| SimError::Registry(format!("type '{}' not found", qualified_name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentType>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
