//! Data manager hosting
//!
//! A data manager exclusively owns one domain's mutable state. Other
//! components read it through shared references and change it only through
//! [`mutate`](crate::simulation::ActorContext::mutate), which runs a closure
//! with the validate, apply and publish steps separated:
//!
//! 1. the closure validates its arguments against the manager's state and
//!    returns a [`ContractError`] before touching anything
//! 2. the closure applies the change and queues events and plans on the
//!    [`MutationScope`]
//! 3. only if the closure returned `Ok`, the kernel publishes the queued
//!    events and schedules the queued plans
//!
//! While the closure runs, the manager is checked out of the registry, so a
//! reentrant lookup reports [`ContractErrorKind::DataManagerUnavailable`].

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::plugin_data::PluginData;
use crate::events::Event;
use crate::plans::{PlanKey, PlanQueue, PlanSpec};
use crate::simulation::{
    ContractError, ContractErrorKind, DataManagerContext, Kernel, SimulationError,
    SimulationResult, StructuralError,
};
use crate::types::{ComponentId, DataManagerId, PluginId};

/// Owner of one domain's mutable state
pub trait DataManager: Any {
    /// Called exactly once, after the owning plugin's dependencies are ready
    fn init(&mut self, context: &mut DataManagerContext<'_>) -> SimulationResult<()>;

    /// End-of-run state, collected when state recording is enabled
    fn state_snapshot(&self) -> Option<Arc<dyn PluginData>> {
        None
    }
}

/// Object-safe view of a data manager as stored by the registry
pub(crate) trait ErasedDataManager {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn init_erased(&mut self, context: &mut DataManagerContext<'_>) -> SimulationResult<()>;
    fn snapshot_erased(&self) -> Option<Arc<dyn PluginData>>;
}

impl<M: DataManager> ErasedDataManager for M {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn init_erased(&mut self, context: &mut DataManagerContext<'_>) -> SimulationResult<()> {
        self.init(context)
    }

    fn snapshot_erased(&self) -> Option<Arc<dyn PluginData>> {
        self.state_snapshot()
    }
}

/// Typed reference to a registered data manager
///
/// Issued at registration; resolving it never involves a type search.
pub struct DataManagerHandle<M> {
    id: DataManagerId,
    _manager: PhantomData<fn() -> M>,
}

impl<M> DataManagerHandle<M> {
    pub(crate) fn new(id: DataManagerId) -> Self {
        Self { id, _manager: PhantomData }
    }

    /// Registry id of the manager
    pub fn id(&self) -> DataManagerId {
        self.id
    }
}

impl<M> Clone for DataManagerHandle<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for DataManagerHandle<M> {}

impl<M> PartialEq for DataManagerHandle<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for DataManagerHandle<M> {}

impl<M> fmt::Debug for DataManagerHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataManagerHandle<{}>({})", std::any::type_name::<M>(), self.id)
    }
}

pub(crate) type Effect = Box<dyn FnOnce(&mut Kernel, DataManagerId) -> SimulationResult<()>>;

/// Collects the side effects of one mutation
///
/// Effects run in the order they were queued, after the mutation closure
/// returns `Ok`. A failed mutation drops them all. Plans are validated as
/// they are queued, against the manager's pending keys and the keys queued
/// earlier in the same mutation, so nothing can fail once the state has
/// changed.
pub struct MutationScope<'k> {
    now: f64,
    owner: ComponentId,
    plans: &'k PlanQueue,
    queued_keys: HashSet<PlanKey>,
    effects: Vec<Effect>,
}

impl<'k> MutationScope<'k> {
    pub(crate) fn new(now: f64, owner: ComponentId, plans: &'k PlanQueue) -> Self {
        Self { now, owner, plans, queued_keys: HashSet::new(), effects: Vec::new() }
    }

    /// Current simulation time
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Queue an event for publication once the mutation succeeds
    pub fn publish<E: Event>(&mut self, event: E) {
        self.effects.push(Box::new(move |kernel: &mut Kernel, _| kernel.publish(event)));
    }

    /// Queue a future plan owned by the mutated manager
    ///
    /// Time and key are validated immediately so the mutation can still be
    /// rejected. Queue plans before changing state: a rejected plan drops
    /// every queued effect but cannot undo writes already made.
    pub fn add_plan<F>(&mut self, spec: PlanSpec, plan: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut DataManagerContext<'_>) -> SimulationResult<()> + 'static,
    {
        if !spec.time().is_finite() || spec.time() < self.now {
            return Err(ContractError::new(
                ContractErrorKind::InvalidTime,
                format!("plan at {} is before current time {}", spec.time(), self.now),
            ));
        }
        if let Some(key) = spec.key() {
            if self.plans.contains_key(&self.owner, key) || self.queued_keys.contains(key) {
                return Err(ContractError::new(
                    ContractErrorKind::DuplicatePlanKey,
                    format!("{} already has a pending plan keyed {}", self.owner, key),
                ));
            }
            self.queued_keys.insert(key.clone());
        }
        self.effects.push(Box::new(move |kernel: &mut Kernel, manager: DataManagerId| {
            let callback = Box::new(move |kernel: &mut Kernel| {
                plan(&mut DataManagerContext::new(kernel, manager))
            });
            kernel
                .schedule(ComponentId::DataManager(manager), spec, callback)
                .map(|_| ())
        }));
        Ok(())
    }

    /// Number of queued effects
    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }

    /// Release the queued effects, ending the borrow of the plan queue
    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

impl fmt::Debug for MutationScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationScope")
            .field("now", &self.now)
            .field("owner", &self.owner)
            .field("effects", &self.effects.len())
            .finish()
    }
}

struct ManagerEntry {
    plugin: PluginId,
    type_name: &'static str,
    slot: Option<Box<dyn ErasedDataManager>>,
    initialized: bool,
}

/// Registration-ordered store of data managers
#[derive(Default)]
pub struct DataManagerRegistry {
    entries: Vec<ManagerEntry>,
    by_type: HashMap<TypeId, Vec<DataManagerId>>,
}

impl DataManagerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register<M: DataManager>(&mut self, plugin: PluginId, manager: M) -> DataManagerHandle<M> {
        let id = DataManagerId(self.entries.len());
        self.entries.push(ManagerEntry {
            plugin,
            type_name: std::any::type_name::<M>(),
            slot: Some(Box::new(manager)),
            initialized: false,
        });
        self.by_type.entry(TypeId::of::<M>()).or_default().push(id);
        DataManagerHandle::new(id)
    }

    /// Resolve the single registered manager of type `M`
    pub(crate) fn resolve<M: DataManager>(&self) -> SimulationResult<DataManagerId> {
        let type_name = std::any::type_name::<M>();
        match self.by_type.get(&TypeId::of::<M>()).map(Vec::as_slice) {
            None | Some([]) => Err(SimulationError::contract(
                ContractErrorKind::UnknownDataManager,
                format!("no data manager of type {}", type_name),
            )),
            Some([id]) => Ok(*id),
            Some(ids) => Err(StructuralError::AmbiguousDataManager { type_name, count: ids.len() }.into()),
        }
    }

    fn entry(&self, id: DataManagerId) -> SimulationResult<&ManagerEntry> {
        self.entries.get(id.0).ok_or_else(|| {
            SimulationError::contract(ContractErrorKind::UnknownDataManager, format!("{} is not registered", id))
        })
    }

    fn entry_mut(&mut self, id: DataManagerId) -> SimulationResult<&mut ManagerEntry> {
        self.entries.get_mut(id.0).ok_or_else(|| {
            SimulationError::contract(ContractErrorKind::UnknownDataManager, format!("{} is not registered", id))
        })
    }

    /// Plugin that registered the manager
    pub(crate) fn owner(&self, id: DataManagerId) -> SimulationResult<&PluginId> {
        Ok(&self.entry(id)?.plugin)
    }

    /// Whether the manager has completed `init`
    pub fn is_initialized(&self, id: DataManagerId) -> bool {
        self.entries.get(id.0).is_some_and(|entry| entry.initialized)
    }

    pub(crate) fn get<M: DataManager>(&self, id: DataManagerId) -> SimulationResult<&M> {
        let entry = self.entry(id)?;
        let manager = entry.slot.as_ref().ok_or_else(|| unavailable(id, entry.type_name))?;
        manager.as_any().downcast_ref::<M>().ok_or_else(|| wrong_type::<M>(id, entry.type_name))
    }

    /// Check a manager out for exclusive use
    pub(crate) fn take(&mut self, id: DataManagerId) -> SimulationResult<Box<dyn ErasedDataManager>> {
        let entry = self.entry_mut(id)?;
        let type_name = entry.type_name;
        entry.slot.take().ok_or_else(|| unavailable(id, type_name))
    }

    /// Return a checked-out manager
    pub(crate) fn restore(&mut self, id: DataManagerId, manager: Box<dyn ErasedDataManager>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.slot = Some(manager);
        }
    }

    pub(crate) fn begin_init(&mut self, id: DataManagerId) -> SimulationResult<()> {
        let entry = self.entry(id)?;
        if entry.initialized {
            return Err(SimulationError::contract(
                ContractErrorKind::DataManagerAlreadyInitialized,
                format!("{} ({}) was already initialized", id, entry.type_name),
            ));
        }
        Ok(())
    }

    pub(crate) fn mark_initialized(&mut self, id: DataManagerId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.initialized = true;
        }
    }

    /// Managers registered by `plugin`, in registration order
    pub(crate) fn registered_by(&self, plugin: &PluginId) -> Vec<DataManagerId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| &entry.plugin == plugin)
            .map(|(index, _)| DataManagerId(index))
            .collect()
    }

    /// End-of-run snapshots by owning plugin, in registration order
    pub(crate) fn snapshots(&self) -> Vec<(PluginId, Arc<dyn PluginData>)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let manager = entry.slot.as_ref()?;
                manager.snapshot_erased().map(|data| (entry.plugin.clone(), data))
            })
            .collect()
    }

    /// Number of registered managers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no managers are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unavailable(id: DataManagerId, type_name: &str) -> SimulationError {
    SimulationError::contract(
        ContractErrorKind::DataManagerUnavailable,
        format!("{} ({}) is currently in use", id, type_name),
    )
}

fn wrong_type<M>(id: DataManagerId, type_name: &str) -> SimulationError {
    SimulationError::contract(
        ContractErrorKind::UnknownDataManager,
        format!("{} is a {}, not a {}", id, type_name, std::any::type_name::<M>()),
    )
}

impl fmt::Debug for DataManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|entry| entry.type_name).collect();
        f.debug_struct("DataManagerRegistry").field("managers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        value: u32,
    }

    impl DataManager for Counter {
        fn init(&mut self, _context: &mut DataManagerContext<'_>) -> SimulationResult<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Other;

    impl DataManager for Other {
        fn init(&mut self, _context: &mut DataManagerContext<'_>) -> SimulationResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_by_type() {
        let mut registry = DataManagerRegistry::new();
        let handle = registry.register(PluginId::new("p"), Counter { value: 3 });

        assert_eq!(registry.resolve::<Counter>().unwrap(), handle.id());
        assert_eq!(registry.get::<Counter>(handle.id()).unwrap().value, 3);

        let error = registry.resolve::<Other>().unwrap_err();
        assert_eq!(error.contract_kind(), Some(ContractErrorKind::UnknownDataManager));
    }

    #[test]
    fn test_ambiguous_type_lookup_is_structural() {
        let mut registry = DataManagerRegistry::new();
        registry.register(PluginId::new("a"), Counter { value: 1 });
        registry.register(PluginId::new("b"), Counter { value: 2 });

        let error = registry.resolve::<Counter>().unwrap_err();
        assert!(error.is_structural());
    }

    #[test]
    fn test_checked_out_manager_is_unavailable() {
        let mut registry = DataManagerRegistry::new();
        let handle = registry.register(PluginId::new("p"), Counter { value: 1 });

        let manager = registry.take(handle.id()).unwrap();
        let error = registry.get::<Counter>(handle.id()).unwrap_err();
        assert_eq!(error.contract_kind(), Some(ContractErrorKind::DataManagerUnavailable));

        registry.restore(handle.id(), manager);
        assert!(registry.get::<Counter>(handle.id()).is_ok());
    }

    #[test]
    fn test_second_init_rejected() {
        let mut registry = DataManagerRegistry::new();
        let handle = registry.register(PluginId::new("p"), Other);

        registry.begin_init(handle.id()).unwrap();
        registry.mark_initialized(handle.id());
        let error = registry.begin_init(handle.id()).unwrap_err();
        assert_eq!(error.contract_kind(), Some(ContractErrorKind::DataManagerAlreadyInitialized));
    }

    #[test]
    fn test_failed_mutation_scope_can_reject_past_plans() {
        let plans = PlanQueue::new();
        let mut scope = MutationScope::new(5.0, ComponentId::DataManager(DataManagerId(0)), &plans);
        let error = scope.add_plan(PlanSpec::at(4.0), |_| Ok(())).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::InvalidTime);
        scope.publish(7u32);
        assert_eq!(scope.pending_effects(), 1);
    }

    #[test]
    fn test_scope_rejects_duplicate_keys_before_applying() {
        let owner = ComponentId::DataManager(DataManagerId(0));
        let mut plans = PlanQueue::new();
        plans.push(owner.clone(), PlanSpec::at(9.0).with_key("taken"), Box::new(|_: &mut Kernel| Ok(())));

        let mut scope = MutationScope::new(0.0, owner, &plans);
        let error = scope.add_plan(PlanSpec::at(2.0).with_key("taken"), |_| Ok(())).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::DuplicatePlanKey);

        scope.add_plan(PlanSpec::at(2.0).with_key("fresh"), |_| Ok(())).unwrap();
        let error = scope.add_plan(PlanSpec::at(3.0).with_key("fresh"), |_| Ok(())).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::DuplicatePlanKey);
        assert_eq!(scope.pending_effects(), 1);
    }
}
