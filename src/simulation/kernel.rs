//! Per-simulation kernel state
//!
//! The kernel owns everything one simulation instance needs: the clock, the
//! plan queue, the event bus, the data managers, cached indexes, report rows
//! and the scenario's random generator. Nothing here is shared between
//! instances, and callbacks are not `Send`, so a kernel never leaves the
//! thread that built it.
//!
//! Components never hold the kernel directly. They receive a context view
//! (see [`super::context`]) that dereferences to the kernel's read-only
//! query methods and adds the operations the component is allowed to do.

use indexmap::{IndexMap, IndexSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

use super::context::{ActorContext, DataManagerContext, PluginContext, ReportContext};
use super::error::{ContractError, ContractErrorKind, SimulationError, SimulationResult, StructuralError};
use super::report::{ReportCollector, ReportItem};
use super::statistics::RunStatistics;
use crate::data::{DataManager, DataManagerHandle, DataManagerRegistry, ErasedDataManager, MutationScope, PluginDataSet};
use crate::events::{CachedIndex, CachedIndexSpec, Event, EventBus, EventHandler, EventLabel};
use crate::plans::{PlanCallback, PlanDataConverters, PlanHandle, PlanQueue, PlanQueueSnapshot, PlanSpec};
use crate::plugins::Plugin;
use crate::types::{ActorId, ComponentId, DataManagerId, EntityId, IndexId, PluginId, ReportId, ScenarioId};

pub(crate) type ActorInit = Box<dyn FnOnce(&mut ActorContext<'_>) -> SimulationResult<()>>;
pub(crate) type ReportInit = Box<dyn FnOnce(&mut ReportContext<'_>) -> SimulationResult<()>>;
pub(crate) type ReportFlush = Rc<dyn Fn(&mut ReportContext<'_>) -> SimulationResult<()>>;

/// State of one simulation instance
pub struct Kernel {
    pub(super) time: f64,
    pub(super) plans: PlanQueue,
    pub(super) bus: EventBus,
    pub(super) managers: DataManagerRegistry,
    pub(super) indexes: Vec<CachedIndex>,
    pub(super) converters: PlanDataConverters,
    pub(super) reports: ReportCollector,
    pub(super) report_ids: IndexSet<ReportId>,
    pub(super) end_of_simulation: Vec<(ReportId, ReportFlush)>,
    pending_actors: Vec<(ActorId, ActorInit)>,
    pending_reports: Vec<(ReportId, ReportInit)>,
    actor_count: usize,
    pub(super) plugin_data: PluginDataSet,
    /// Each plugin with its transitive dependencies
    dependency_closures: IndexMap<PluginId, IndexSet<PluginId>>,
    /// Plugin whose initialization is in progress
    init_scope: Option<PluginId>,
    rng: StdRng,
    halt_requested: bool,
    halt_time: Option<f64>,
    resumed: bool,
    scenario: Option<ScenarioId>,
    pub(super) statistics: RunStatistics,
}

impl Kernel {
    pub(crate) fn new(
        seed: u64,
        halt_time: Option<f64>,
        scenario: Option<ScenarioId>,
        dependency_closures: IndexMap<PluginId, IndexSet<PluginId>>,
    ) -> Self {
        Self {
            time: 0.0,
            plans: PlanQueue::new(),
            bus: EventBus::new(),
            managers: DataManagerRegistry::new(),
            indexes: Vec::new(),
            converters: PlanDataConverters::default(),
            reports: ReportCollector::default(),
            report_ids: IndexSet::new(),
            end_of_simulation: Vec::new(),
            pending_actors: Vec::new(),
            pending_reports: Vec::new(),
            actor_count: 0,
            plugin_data: PluginDataSet::new(),
            dependency_closures,
            init_scope: None,
            rng: StdRng::seed_from_u64(seed),
            halt_requested: false,
            halt_time,
            resumed: false,
            scenario,
            statistics: RunStatistics::new(),
        }
    }

    // ----- read-only queries shared by every context -----

    /// Current simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Scenario this instance runs, if started by an experiment
    pub fn scenario_id(&self) -> Option<ScenarioId> {
        self.scenario
    }

    /// Whether this run continues from a captured state
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Configured halt time, if any
    pub fn halt_time(&self) -> Option<f64> {
        self.halt_time
    }

    /// Number of pending plans
    pub fn pending_plans(&self) -> usize {
        self.plans.len()
    }

    /// Counters gathered so far
    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    /// Resolve the single data manager of type `M`
    ///
    /// During plugin and data-manager initialization, the manager must belong
    /// to an already initialized dependency of the initializing plugin.
    pub fn data_manager<M: DataManager>(&self) -> SimulationResult<DataManagerHandle<M>> {
        let id = self.managers.resolve::<M>()?;
        self.check_lookup(id, std::any::type_name::<M>())?;
        Ok(DataManagerHandle::new(id))
    }

    /// Borrow a data manager for queries
    pub fn data_manager_ref<M: DataManager>(&self, handle: DataManagerHandle<M>) -> SimulationResult<&M> {
        self.check_lookup(handle.id(), std::any::type_name::<M>())?;
        self.managers.get::<M>(handle.id())
    }

    /// A cached index
    pub fn cached_index(&self, id: IndexId) -> SimulationResult<&CachedIndex> {
        self.indexes.get(id.0).ok_or_else(|| {
            SimulationError::contract(ContractErrorKind::UnknownIndex, format!("{} is not registered", id))
        })
    }

    /// Members of a cached index, in ascending entity order
    pub fn index_members(&self, id: IndexId) -> SimulationResult<&BTreeSet<EntityId>> {
        Ok(self.cached_index(id)?.members())
    }

    fn check_lookup(&self, id: DataManagerId, type_name: &'static str) -> SimulationResult<()> {
        let Some(scope) = &self.init_scope else {
            return Ok(());
        };
        let owner = self.managers.owner(id)?;
        let reachable = self
            .dependency_closures
            .get(scope)
            .is_some_and(|closure| closure.contains(owner));
        if reachable && self.managers.is_initialized(id) {
            Ok(())
        } else {
            Err(StructuralError::UnresolvedDataManagerDependency { requester: scope.clone(), type_name }.into())
        }
    }

    // ----- capabilities exposed through contexts -----

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn request_halt(&mut self) {
        crate::sim_event!(debug, "Halt requested", time = self.time);
        self.halt_requested = true;
    }

    /// Add a plan after validating its time and key
    pub(crate) fn schedule(
        &mut self,
        owner: ComponentId,
        spec: PlanSpec,
        callback: PlanCallback,
    ) -> SimulationResult<PlanHandle> {
        if !spec.time.is_finite() || spec.time < self.time {
            return Err(SimulationError::contract(
                ContractErrorKind::InvalidTime,
                format!("{} scheduled a plan at {} before current time {}", owner, spec.time, self.time),
            ));
        }
        if let Some(key) = &spec.key {
            if self.plans.contains_key(&owner, key) {
                return Err(SimulationError::contract(
                    ContractErrorKind::DuplicatePlanKey,
                    format!("{} already has a pending plan keyed {}", owner, key),
                ));
            }
        }
        Ok(self.plans.push(owner, spec, callback))
    }

    /// Add a plan whose callback comes from the owner's registered converter
    pub(crate) fn schedule_data_plan(&mut self, owner: ComponentId, spec: PlanSpec) -> SimulationResult<PlanHandle> {
        let Some(data) = spec.data.as_ref() else {
            return Err(SimulationError::contract(
                ContractErrorKind::InvalidValue,
                format!("{} scheduled a data plan without plan data", owner),
            ));
        };
        let callback = self.converters.convert_payload(&owner, data)?;
        self.schedule(owner, spec, callback)
    }

    /// Deliver an event to index refreshers, type subscribers and label subscribers
    pub(crate) fn publish<E: Event>(&mut self, event: E) -> SimulationResult<()> {
        let event_type = std::any::TypeId::of::<E>();
        let labels: Vec<EventLabel> = self
            .bus
            .labelers_for(event_type)
            .iter()
            .filter_map(|labeler| (labeler.label)(self, &event))
            .collect();
        let handlers = self.bus.handlers_for(event_type, &labels);
        self.bus.record_publication();
        trace!("Publishing {:?} to {} handlers", event, handlers.len());

        for handler in handlers {
            handler(self, &event)?;
        }
        Ok(())
    }

    /// Run a mutation against a data manager
    ///
    /// The manager is checked out while `mutation` runs. Queued effects are
    /// applied only if it returns `Ok`.
    pub(crate) fn mutate<M, R, F>(&mut self, handle: DataManagerHandle<M>, mutation: F) -> SimulationResult<R>
    where
        M: DataManager,
        F: FnOnce(&mut M, &mut MutationScope<'_>) -> Result<R, ContractError>,
    {
        let id = handle.id();
        self.check_lookup(id, std::any::type_name::<M>())?;
        if !self.managers.is_initialized(id) {
            return Err(SimulationError::contract(
                ContractErrorKind::DataManagerUnavailable,
                format!("{} is not initialized", id),
            ));
        }

        let mut manager = self.managers.take(id)?;
        let mut scope = MutationScope::new(self.time, ComponentId::DataManager(id), &self.plans);
        let outcome = match manager.as_any_mut().downcast_mut::<M>() {
            Some(manager) => mutation(manager, &mut scope).map_err(SimulationError::from),
            None => Err(SimulationError::contract(
                ContractErrorKind::UnknownDataManager,
                format!("{} is not a {}", id, std::any::type_name::<M>()),
            )),
        };
        let effects = scope.into_effects();
        self.managers.restore(id, manager);

        let value = outcome?;
        for effect in effects {
            effect(self, id)?;
        }
        Ok(value)
    }

    /// Build a cached index and subscribe its refreshers
    pub(crate) fn add_cached_index(&mut self, spec: CachedIndexSpec) -> SimulationResult<IndexId> {
        let id = IndexId(self.indexes.len());
        let mut index = CachedIndex::new(spec.name.clone());
        for entity in (spec.population)(self)? {
            let member = (spec.predicate)(self, entity)?;
            index.set_membership(entity, member);
        }
        debug!("Cached index {} '{}' starts with {} members", id, spec.name, index.len());
        self.indexes.push(index);

        for sensitivity in spec.sensitivities {
            let predicate = Rc::clone(&spec.predicate);
            let stale = sensitivity.stale;
            let handler: EventHandler = Rc::new(move |kernel: &mut Kernel, event: &dyn Any| {
                for entity in stale(kernel, event) {
                    let member = predicate(kernel, entity)?;
                    if let Some(index) = kernel.indexes.get_mut(id.0) {
                        index.set_membership(entity, member);
                    }
                }
                Ok(())
            });
            self.bus.subscribe_index_refresh(sensitivity.event_type, ComponentId::Index(id), handler);
        }
        Ok(id)
    }

    pub(crate) fn release_report_item(&mut self, report: ReportId, item: ReportItem) -> SimulationResult<()> {
        self.reports.release(report, item)?;
        Ok(())
    }

    // ----- registration during plugin init -----

    pub(crate) fn add_actor(&mut self, init: ActorInit) -> ActorId {
        let id = ActorId(self.actor_count);
        self.actor_count += 1;
        self.pending_actors.push((id, init));
        id
    }

    pub(crate) fn add_report(&mut self, id: ReportId, init: ReportInit) -> SimulationResult<()> {
        if !self.report_ids.insert(id.clone()) {
            return Err(StructuralError::DuplicateReport(id).into());
        }
        self.pending_reports.push((id, init));
        Ok(())
    }

    // ----- lifecycle, driven by the simulation instance -----

    pub(crate) fn set_resume_point(&mut self, time: f64) {
        self.time = time;
        self.resumed = true;
    }

    pub(crate) fn set_rng(&mut self, rng: StdRng) {
        self.rng = rng;
    }

    /// Run a plugin's init, then initialize the data managers it registered
    pub(crate) fn initialize_plugin(&mut self, plugin: Plugin) -> SimulationResult<()> {
        let (id, data, init) = plugin.into_parts();
        for value in data {
            self.plugin_data.insert_arc(id.clone(), value);
        }

        self.init_scope = Some(id.clone());
        let result = init(&mut PluginContext::new(self, id.clone())).and_then(|()| {
            for manager in self.managers.registered_by(&id) {
                self.initialize_data_manager(manager)?;
            }
            Ok(())
        });
        self.init_scope = None;
        self.statistics.plugins += 1;
        debug!("Initialized {}", id);
        result
    }

    fn initialize_data_manager(&mut self, id: DataManagerId) -> SimulationResult<()> {
        self.managers.begin_init(id)?;
        let mut manager: Box<dyn ErasedDataManager> = self.managers.take(id)?;
        let result = manager.init_erased(&mut DataManagerContext::new(self, id));
        self.managers.restore(id, manager);
        result?;
        self.managers.mark_initialized(id);
        Ok(())
    }

    pub(crate) fn initialize_reports(&mut self) -> SimulationResult<()> {
        for (id, init) in std::mem::take(&mut self.pending_reports) {
            init(&mut ReportContext::new(self, id))?;
            self.statistics.reports += 1;
        }
        Ok(())
    }

    pub(crate) fn initialize_actors(&mut self) -> SimulationResult<()> {
        for (id, init) in std::mem::take(&mut self.pending_actors) {
            init(&mut ActorContext::new(self, id))?;
            self.statistics.actors += 1;
        }
        self.statistics.data_managers = self.managers.len();
        Ok(())
    }

    pub(crate) fn restore_plans(&mut self, snapshot: PlanQueueSnapshot) -> SimulationResult<()> {
        for plan in snapshot.plans {
            let callback = self.converters.convert(&plan)?;
            let spec = PlanSpec {
                time: plan.time,
                priority: plan.priority,
                key: plan.key,
                active: plan.active,
                data: Some(plan.data),
            };
            self.schedule(plan.owner, spec, callback)?;
            self.statistics.plans_restored += 1;
        }
        Ok(())
    }

    /// Execute plans in order until no active plan remains, a halt is
    /// requested or the next plan lies beyond the halt time
    pub(crate) fn run_plans(&mut self) -> SimulationResult<()> {
        while !self.halt_requested && self.plans.has_active() {
            let Some(next) = self.plans.next_time() else {
                break;
            };
            if let Some(halt_time) = self.halt_time {
                if next > halt_time {
                    self.time = self.time.max(halt_time);
                    self.statistics.halted = true;
                    break;
                }
            }
            let Some(plan) = self.plans.pop() else {
                break;
            };
            self.time = plan.time;
            self.statistics.increment_plans_executed();
            (plan.callback)(self)?;
        }
        if self.halt_requested {
            self.statistics.halted = true;
        }
        Ok(())
    }

    pub(crate) fn finish_reports(&mut self) -> SimulationResult<()> {
        for (id, flush) in std::mem::take(&mut self.end_of_simulation) {
            flush(&mut ReportContext::new(self, id))?;
        }
        Ok(())
    }

    pub(crate) fn capture_plans(&self) -> PlanQueueSnapshot {
        self.plans.snapshot()
    }

    pub(crate) fn rng_state(&self) -> StdRng {
        self.rng.clone()
    }

    pub(crate) fn data_manager_snapshots(&self) -> PluginDataSet {
        let mut set = PluginDataSet::new();
        for (plugin, data) in self.managers.snapshots() {
            set.insert_arc(plugin, data);
        }
        set
    }

    pub(crate) fn into_report_items(self) -> Vec<ReportItem> {
        self.reports.into_items()
    }

    pub(crate) fn finalize_statistics(&mut self) -> RunStatistics {
        self.statistics.final_time = self.time;
        self.statistics.events_published = self.bus.published_count();
        self.statistics.report_items = self.reports.len();
        self.statistics.clone()
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("time", &self.time)
            .field("pending_plans", &self.plans.len())
            .field("bus", &self.bus)
            .field("managers", &self.managers)
            .field("indexes", &self.indexes.len())
            .field("scenario", &self.scenario)
            .field("resumed", &self.resumed)
            .finish_non_exhaustive()
    }
}
