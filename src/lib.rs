//! Agent Simulation Kernel
//!
//! A deterministic discrete-event kernel for agent-based simulations, and a
//! parallel experiment runner that executes many independent scenarios of a
//! model with reproducible seeds and resumable output.
//!
//! # Overview
//!
//! A model is a set of plugins. Each plugin registers data managers (owners
//! of mutable state), actors (reactive agents) and reports (read-only
//! observers). At run time every component reaches the kernel only through
//! a capability context, which offers exactly the operations that kind of
//! component may perform.
//!
//! ## Key Features
//!
//! - **Plan Scheduling**: time-ordered plans with priorities, keys and
//!   passive plans that do not keep a run alive
//! - **Typed Event Bus**: subscriptions by event type or by label, with
//!   labelers resolving events to labels once per publication
//! - **Data Managers**: the validate, apply, publish discipline for every
//!   state change
//! - **Plugin Resolution**: dependency ordering with cycle detection
//! - **Snapshots**: a run can stop at a halt time and continue later from
//!   its recorded state
//! - **Experiments**: cross-product scenario expansion, worker pool,
//!   byte-identical output regardless of thread count, progress log resume
//!
//! ## Quick Start
//!
//! ```rust
//! use agent_sim_kernel::demo::{self, DiseaseData};
//! use agent_sim_kernel::simulation::Simulation;
//!
//! let data = demo::base_data(DiseaseData::builder().population_size(100).build()?);
//! let outcome = Simulation::builder()
//!     .add_plugins(demo::plugins(&data)?)
//!     .seed(42)
//!     .build()?
//!     .run()?;
//! println!("{}", outcome.statistics);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: Identifiers and experiment configuration
//! - [`plans`]: Plans, the plan queue and queue snapshots
//! - [`events`]: Events, labels, the event bus and cached indexes
//! - [`data`]: Data managers and plugin data
//! - [`plugins`]: Plugins and dependency resolution
//! - [`simulation`]: Simulation instances, contexts, reports, errors, logging
//! - [`experiment`]: Multi-scenario experiments
//! - [`demo`]: A susceptible-infectious-recovered model built on the kernel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ Experiment  │───►│ Simulation  │───►│   Plugins   │
//! │             │    │             │    │             │
//! │ Scenarios   │    │ Kernel      │    │ Resolver    │
//! │ Workers     │    │ Contexts    │    │ Init order  │
//! │ Output      │    │ Reports     │    │             │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!                           │
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │    Plans    │    │   Events    │    │    Data     │
//! │             │    │             │    │             │
//! │ Queue       │    │ Bus         │    │ Managers    │
//! │ Snapshots   │    │ Labels      │    │ Plugin data │
//! └─────────────┘    └─────────────┘    └─────────────┘
//! ```
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

// Module declarations
pub mod data;
pub mod demo;
pub mod events;
pub mod experiment;
pub mod plans;
pub mod plugins;
pub mod simulation;
pub mod types;

// Core types and identifiers
pub use types::{
    // Identifiers
    ActorId,
    ComponentId,
    // Configuration
    ConfigValidationError,
    DataManagerId,
    EntityId,
    ExperimentConfig,
    IndexId,
    PluginId,
    ReportId,
    ScenarioId,
};

// Scheduling, events and data
pub use data::{DataManager, DataManagerHandle, MutationScope, PluginData, PluginDataSet};
pub use events::{CachedIndexSpec, Event, EventLabel, EventLabeler};
pub use plans::{PlanData, PlanKey, PlanSpec};
pub use plugins::Plugin;

// Simulation types and functionality
pub use simulation::{
    ActorContext, ContractError, ContractErrorKind, DataManagerContext, PluginContext, ReportContext,
    ReportHeader, ReportItem, ReportPeriod, RunStatistics, Simulation, SimulationError, SimulationOutcome,
    SimulationResult, SimulationState, StructuralError,
};

// Experiments
pub use experiment::{
    Dimension, Experiment, ExperimentError, ExperimentReport, ExperimentSettings, ExperimentStatistics,
    ScenarioStatus,
};
