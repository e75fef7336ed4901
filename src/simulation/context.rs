//! Capability-scoped views of the kernel
//!
//! Every component sees the kernel through a context that names it:
//!
//! - [`ActorContext`]: schedules plans, subscribes to events, mutates data
//!   managers
//! - [`DataManagerContext`]: the same, plus publishing events and registering
//!   labelers
//! - [`ReportContext`]: the same as an actor, plus releasing report rows and
//!   periodic flushes
//! - [`PluginContext`]: registration of data managers, actors, reports and
//!   labelers during plugin initialization
//!
//! Each context dereferences to [`Kernel`] for read-only queries. Plans,
//! subscriptions and converters added through a context belong to the
//! component it names, and their callbacks receive the same kind of context.

use rand::rngs::StdRng;
use std::any::{Any, TypeId};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use super::error::{ContractError, ContractErrorKind, SimulationError, SimulationResult};
use super::kernel::{Kernel, ReportFlush};
use super::report::{ReportItem, ReportPeriod};
use crate::data::{DataManager, DataManagerHandle, MutationScope, PluginData};
use crate::events::{CachedIndexSpec, Event, EventHandler, EventLabel, EventLabeler};
use crate::plans::{downcast_plan_data, ConverterFn, PlanCallback, PlanData, PlanHandle, PlanKey, PlanSpec};
use crate::types::{ActorId, ComponentId, DataManagerId, IndexId, PluginId, ReportId};

/// Generates the operations shared by actor, data manager and report contexts
macro_rules! component_context {
    ($context:ident, $id:ty, $variant:ident) => {
        impl<'a> $context<'a> {
            pub(crate) fn new(kernel: &'a mut Kernel, id: $id) -> Self {
                Self { kernel, id }
            }

            /// Id of the component this context belongs to
            pub fn id(&self) -> $id {
                self.id.clone()
            }

            fn owner(&self) -> ComponentId {
                ComponentId::$variant(self.id.clone())
            }

            /// Schedule `plan` at `time`
            pub fn add_plan<F>(&mut self, time: f64, plan: F) -> SimulationResult<PlanHandle>
            where
                F: FnOnce(&mut $context<'_>) -> SimulationResult<()> + 'static,
            {
                self.add_plan_spec(PlanSpec::at(time), plan)
            }

            /// Schedule `plan` with explicit key, priority, payload or passivity
            pub fn add_plan_spec<F>(&mut self, spec: PlanSpec, plan: F) -> SimulationResult<PlanHandle>
            where
                F: FnOnce(&mut $context<'_>) -> SimulationResult<()> + 'static,
            {
                let id = self.id.clone();
                let callback: PlanCallback =
                    Box::new(move |kernel: &mut Kernel| plan(&mut $context::new(kernel, id)));
                self.kernel.schedule(self.owner(), spec, callback)
            }

            /// Schedule a plan whose behavior comes from the registered
            /// converter for its plan data
            pub fn add_data_plan(&mut self, spec: PlanSpec) -> SimulationResult<PlanHandle> {
                self.kernel.schedule_data_plan(self.owner(), spec)
            }

            /// Remove a pending plan; `false` if the key is unknown or already ran
            pub fn remove_plan(&mut self, key: &PlanKey) -> bool {
                let owner = self.owner();
                self.kernel.plans.remove(&owner, key)
            }

            /// Payload of a pending keyed plan
            pub fn get_plan_data(&self, key: &PlanKey) -> Option<Arc<dyn PlanData>> {
                self.kernel.plans.plan_data(&self.owner(), key).cloned()
            }

            /// Register how plans carrying a `P` payload are rebuilt
            pub fn set_plan_data_converter<P, F>(&mut self, converter: F)
            where
                P: PlanData,
                F: Fn(&mut $context<'_>, &P) -> SimulationResult<()> + 'static,
            {
                let id = self.id.clone();
                let converter = Rc::new(converter);
                let build: ConverterFn = Rc::new(move |data: Arc<dyn PlanData>| {
                    let id = id.clone();
                    let converter = Rc::clone(&converter);
                    let callback: PlanCallback = Box::new(move |kernel: &mut Kernel| {
                        let payload = downcast_plan_data::<P>(&*data).ok_or_else(|| {
                            SimulationError::contract(
                                ContractErrorKind::UnknownPlanDataType,
                                format!("expected {}", std::any::type_name::<P>()),
                            )
                        })?;
                        converter(&mut $context::new(kernel, id), payload)
                    });
                    callback
                });
                let owner = self.owner();
                self.kernel.converters.register(owner, TypeId::of::<P>(), build);
            }

            /// Receive every published `E`
            pub fn subscribe<E, F>(&mut self, handler: F) -> SimulationResult<()>
            where
                E: Event,
                F: Fn(&mut $context<'_>, &E) -> SimulationResult<()> + 'static,
            {
                let handler = Self::erase_handler(self.id.clone(), handler);
                let owner = self.owner();
                self.kernel
                    .bus
                    .subscribe(TypeId::of::<E>(), std::any::type_name::<E>(), owner, handler)?;
                Ok(())
            }

            /// Receive only the events that map to `label`
            pub fn subscribe_by_label<E, F>(&mut self, label: EventLabel, handler: F) -> SimulationResult<()>
            where
                E: Event,
                F: Fn(&mut $context<'_>, &E) -> SimulationResult<()> + 'static,
            {
                if label.event_type() != TypeId::of::<E>() {
                    return Err(SimulationError::contract(
                        ContractErrorKind::InvalidValue,
                        format!("label {} does not apply to {}", label, std::any::type_name::<E>()),
                    ));
                }
                let handler = Self::erase_handler(self.id.clone(), handler);
                let owner = self.owner();
                self.kernel.bus.subscribe_by_label(label, owner, handler)?;
                Ok(())
            }

            /// Stop receiving `E`; `false` if not subscribed
            pub fn unsubscribe<E: Event>(&mut self) -> bool {
                let owner = self.owner();
                self.kernel.bus.unsubscribe(TypeId::of::<E>(), &owner)
            }

            /// Stop receiving a label; `false` if not subscribed
            pub fn unsubscribe_by_label(&mut self, label: &EventLabel) -> bool {
                let owner = self.owner();
                self.kernel.bus.unsubscribe_by_label(label, &owner)
            }

            fn erase_handler<E, F>(id: $id, handler: F) -> EventHandler
            where
                E: Event,
                F: Fn(&mut $context<'_>, &E) -> SimulationResult<()> + 'static,
            {
                Rc::new(move |kernel: &mut Kernel, event: &dyn Any| match event.downcast_ref::<E>() {
                    Some(event) => handler(&mut $context::new(kernel, id.clone()), event),
                    None => Ok(()),
                })
            }

            /// Validate, apply and publish through a data manager
            pub fn mutate<M, R, F>(&mut self, handle: DataManagerHandle<M>, mutation: F) -> SimulationResult<R>
            where
                M: DataManager,
                F: FnOnce(&mut M, &mut MutationScope<'_>) -> Result<R, ContractError>,
            {
                self.kernel.mutate(handle, mutation)
            }

            /// Build a cached index kept current by its sensitivities
            pub fn add_cached_index(&mut self, spec: CachedIndexSpec) -> SimulationResult<IndexId> {
                self.kernel.add_cached_index(spec)
            }

            /// The scenario's random generator
            pub fn rng(&mut self) -> &mut StdRng {
                self.kernel.rng_mut()
            }

            /// Stop the run after the current plan
            pub fn halt(&mut self) {
                self.kernel.request_halt();
            }
        }

        impl Deref for $context<'_> {
            type Target = Kernel;

            fn deref(&self) -> &Kernel {
                self.kernel
            }
        }

        impl fmt::Debug for $context<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($context))
                    .field("id", &self.id)
                    .field("time", &self.kernel.time())
                    .finish()
            }
        }
    };
}

/// Context of an actor
pub struct ActorContext<'a> {
    kernel: &'a mut Kernel,
    id: ActorId,
}

component_context!(ActorContext, ActorId, Actor);

/// Context of a data manager
pub struct DataManagerContext<'a> {
    kernel: &'a mut Kernel,
    id: DataManagerId,
}

component_context!(DataManagerContext, DataManagerId, DataManager);

impl DataManagerContext<'_> {
    /// Typed handle to the manager this context belongs to
    pub fn own_handle<M: DataManager>(&self) -> SimulationResult<DataManagerHandle<M>> {
        let handle = DataManagerHandle::new(self.id);
        match self.kernel.managers.resolve::<M>() {
            Ok(id) if id == self.id => Ok(handle),
            _ => Err(SimulationError::contract(
                ContractErrorKind::UnknownDataManager,
                format!("{} is not the {}", self.id, std::any::type_name::<M>()),
            )),
        }
    }

    /// Publish an event directly
    pub fn publish<E: Event>(&mut self, event: E) -> SimulationResult<()> {
        self.kernel.publish(event)
    }

    /// Register a labeler for events this manager publishes
    pub fn add_labeler<E: Event>(&mut self, labeler: EventLabeler<E>) -> SimulationResult<()> {
        self.kernel.bus.add_labeler(TypeId::of::<E>(), labeler.erase())?;
        Ok(())
    }
}

/// Context of a report
pub struct ReportContext<'a> {
    kernel: &'a mut Kernel,
    id: ReportId,
}

component_context!(ReportContext, ReportId, Report);

impl ReportContext<'_> {
    /// Release a row under this report's id
    pub fn release_report_item(&mut self, item: ReportItem) -> SimulationResult<()> {
        let id = self.id.clone();
        self.kernel.release_report_item(id, item)
    }

    /// Run `flush` every interval or once at the end of the run
    ///
    /// Interval flushes are passive plans that run after every other plan
    /// scheduled for the same time.
    pub fn subscribe_to_period<F>(&mut self, period: ReportPeriod, flush: F) -> SimulationResult<()>
    where
        F: Fn(&mut ReportContext<'_>) -> SimulationResult<()> + 'static,
    {
        let flush: ReportFlush = Rc::new(flush);
        match period {
            ReportPeriod::Interval(dt) => {
                if !dt.is_finite() || dt <= 0.0 {
                    return Err(SimulationError::contract(
                        ContractErrorKind::InvalidValue,
                        format!("report interval must be positive, got {}", dt),
                    ));
                }
                schedule_flush(self, dt, flush)
            }
            ReportPeriod::EndOfSimulation => {
                let id = self.id.clone();
                self.kernel.end_of_simulation.push((id, flush));
                Ok(())
            }
        }
    }
}

fn schedule_flush(context: &mut ReportContext<'_>, dt: f64, flush: ReportFlush) -> SimulationResult<()> {
    let spec = PlanSpec::at(context.time() + dt).passive().with_priority(i32::MAX);
    context.add_plan_spec(spec, move |context| {
        flush(context)?;
        schedule_flush(context, dt, flush)
    })?;
    Ok(())
}

/// Context of a plugin during its initialization
pub struct PluginContext<'a> {
    kernel: &'a mut Kernel,
    id: PluginId,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(kernel: &'a mut Kernel, id: PluginId) -> Self {
        Self { kernel, id }
    }

    /// Id of the initializing plugin
    pub fn plugin_id(&self) -> &PluginId {
        &self.id
    }

    /// This plugin's data of type `T`
    pub fn plugin_data<T: PluginData>(&self) -> SimulationResult<&T> {
        Ok(self.kernel.plugin_data.require::<T>(&self.id)?)
    }

    /// This plugin's data of type `T`, if it was supplied
    pub fn optional_plugin_data<T: PluginData>(&self) -> Option<&T> {
        self.kernel.plugin_data.get::<T>(&self.id)
    }

    /// Register a data manager; it is initialized right after this plugin's init
    pub fn add_data_manager<M: DataManager>(&mut self, manager: M) -> DataManagerHandle<M> {
        self.kernel.managers.register(self.id.clone(), manager)
    }

    /// Register an actor; actors are initialized after all reports
    pub fn add_actor<F>(&mut self, init: F) -> ActorId
    where
        F: FnOnce(&mut ActorContext<'_>) -> SimulationResult<()> + 'static,
    {
        self.kernel.add_actor(Box::new(init))
    }

    /// Register a report; reports are initialized after all data managers
    pub fn add_report<F>(&mut self, id: impl Into<ReportId>, init: F) -> SimulationResult<()>
    where
        F: FnOnce(&mut ReportContext<'_>) -> SimulationResult<()> + 'static,
    {
        self.kernel.add_report(id.into(), Box::new(init))
    }

    /// Register a labeler
    pub fn add_labeler<E: Event>(&mut self, labeler: EventLabeler<E>) -> SimulationResult<()> {
        self.kernel.bus.add_labeler(TypeId::of::<E>(), labeler.erase())?;
        Ok(())
    }
}

impl Deref for PluginContext<'_> {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        self.kernel
    }
}

impl fmt::Debug for PluginContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext").field("id", &self.id).finish()
    }
}
