//! Plan snapshots and plan-data converters
//!
//! Closures cannot be captured in a snapshot, so only plans carrying a
//! [`PlanData`] payload survive. On resume, each payload is handed to the
//! converter its owning component registered for that payload type, which
//! turns it back into a runnable callback.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::plan::{PlanCallback, PlanData, PlanKey};
use crate::simulation::{ContractErrorKind, SimulationError, SimulationResult};
use crate::types::ComponentId;

/// A pending plan captured in a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotPlan {
    /// Component that scheduled the plan
    pub owner: ComponentId,
    /// Scheduled time
    pub time: f64,
    /// Tie-break priority
    pub priority: i32,
    /// Removal key
    pub key: Option<PlanKey>,
    /// Whether the plan keeps the simulation alive
    pub active: bool,
    /// Payload used to rebuild the callback
    pub data: Arc<dyn PlanData>,
}

/// Pending plans in execution order
#[derive(Debug, Clone, Default)]
pub struct PlanQueueSnapshot {
    /// Plans sorted by (time, priority, arrival)
    pub plans: Vec<SnapshotPlan>,
}

impl PlanQueueSnapshot {
    /// Number of captured plans
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Check if no plans were captured
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Rebuilds a callback from a payload for one component and payload type
pub(crate) type ConverterFn = Rc<dyn Fn(Arc<dyn PlanData>) -> PlanCallback>;

/// Converters keyed by owning component and payload type
#[derive(Default)]
pub(crate) struct PlanDataConverters {
    converters: HashMap<(ComponentId, TypeId), ConverterFn>,
}

impl PlanDataConverters {
    pub(crate) fn register(&mut self, owner: ComponentId, payload: TypeId, converter: ConverterFn) {
        self.converters.insert((owner, payload), converter);
    }

    /// Rebuild the callback of a captured plan
    pub(crate) fn convert(&self, plan: &SnapshotPlan) -> SimulationResult<PlanCallback> {
        self.convert_payload(&plan.owner, &plan.data)
    }

    /// Build the callback for a payload owned by `owner`
    pub(crate) fn convert_payload(
        &self,
        owner: &ComponentId,
        data: &Arc<dyn PlanData>,
    ) -> SimulationResult<PlanCallback> {
        let payload: &dyn PlanData = &**data;
        let converter = self
            .converters
            .get(&(owner.clone(), payload.payload_type()))
            .ok_or_else(|| {
                SimulationError::contract(
                    ContractErrorKind::UnknownPlanDataType,
                    format!("{} registered no converter for {}", owner, payload.payload_type_name()),
                )
            })?;
        Ok(converter(Arc::clone(data)))
    }
}

impl fmt::Debug for PlanDataConverters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanDataConverters")
            .field("registered", &self.converters.len())
            .finish()
    }
}
