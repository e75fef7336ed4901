//! Plan scheduling
//!
//! This module contains the time-ordered plan queue that drives a simulation
//! instance, the plan description types, and the snapshot/converter pair that
//! lets pending plans outlive the closures that created them.
//!
//! # Overview
//!
//! - **PlanSpec**: time, priority, key, passive flag and optional payload
//! - **PlanQueue**: min-heap ordered by `(time, priority, sequence)`
//! - **PlanQueueSnapshot**: pending plans that carry plan data
//!
//! Plans are added through the context views in [`crate::simulation`], which
//! validate the time against the current simulation time.

pub mod converter;
pub mod plan;
pub mod queue;

pub use converter::{PlanQueueSnapshot, SnapshotPlan};
pub use plan::{downcast_plan_data, PlanData, PlanHandle, PlanId, PlanKey, PlanSpec};
pub use queue::PlanQueue;

pub(crate) use converter::{ConverterFn, PlanDataConverters};
pub(crate) use plan::PlanCallback;
