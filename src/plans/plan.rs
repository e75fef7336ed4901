//! Plan descriptions
//!
//! A plan is a callback scheduled for a simulation time. This module holds
//! the parts of a plan that are independent of the callback itself: the
//! ordering fields, the optional key used for removal and the optional
//! plan-data payload used to rebuild the callback after a snapshot.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::simulation::{Kernel, SimulationResult};

/// Type-erased plan callback as stored by the scheduler
pub(crate) type PlanCallback = Box<dyn FnOnce(&mut Kernel) -> SimulationResult<()>>;

/// Key used to find and remove a pending plan
///
/// Keys are scoped to the component that scheduled the plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanKey(String);

impl PlanKey {
    /// Create a plan key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PlanKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Arrival sequence number of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u64);

/// Returned by the scheduler when a plan is accepted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanHandle {
    /// Arrival sequence of the plan
    pub id: PlanId,
    /// Scheduled time
    pub time: f64,
}

/// Serializable payload that describes what a plan will do
///
/// Any `'static + Debug + Send + Sync` value qualifies. A model normally uses
/// one enum per planner so that the converter is an exhaustive match.
pub trait PlanData: Any + fmt::Debug + Send + Sync {
    /// Upcast for downcasting to the concrete payload type
    fn as_any(&self) -> &dyn Any;

    /// Type id of the concrete payload
    fn payload_type(&self) -> TypeId;

    /// Type name of the concrete payload, for diagnostics
    fn payload_type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug + Send + Sync> PlanData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn payload_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn payload_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Scheduling options for a plan, without its callback
///
/// ```rust
/// use agent_sim_kernel::plans::PlanSpec;
///
/// let spec = PlanSpec::at(4.5).with_key("recovery:12").with_priority(-1).passive();
/// assert_eq!(spec.time(), 4.5);
/// assert!(!spec.is_active());
/// ```
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub(crate) time: f64,
    pub(crate) priority: i32,
    pub(crate) key: Option<PlanKey>,
    pub(crate) active: bool,
    pub(crate) data: Option<Arc<dyn PlanData>>,
}

impl PlanSpec {
    /// An active, unkeyed plan at the given time with default priority
    pub fn at(time: f64) -> Self {
        Self { time, priority: 0, key: None, active: true, data: None }
    }

    /// Attach a removal key
    pub fn with_key(mut self, key: impl Into<PlanKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Order before (negative) or after (positive) other plans at the same time
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Passive plans do not keep the simulation running on their own
    pub fn passive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Attach a plan-data payload so the plan survives a state snapshot
    pub fn with_data<P: PlanData>(mut self, data: P) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    /// Scheduled time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Tie-break priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Removal key, if any
    pub fn key(&self) -> Option<&PlanKey> {
        self.key.as_ref()
    }

    /// Whether the plan keeps the simulation alive
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Plan-data payload, if any
    pub fn data(&self) -> Option<&Arc<dyn PlanData>> {
        self.data.as_ref()
    }
}

/// Downcast a plan-data payload to its concrete type
pub fn downcast_plan_data<P: PlanData>(data: &dyn PlanData) -> Option<&P> {
    data.as_any().downcast_ref::<P>()
}
