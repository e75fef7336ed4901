//! Simulation instances and their kernel
//!
//! This module contains the per-instance kernel, the capability-scoped
//! contexts through which components reach it, report rows, statistics,
//! error types and logging setup.
//!
//! # Overview
//!
//! - **Simulation / SimulationBuilder**: one isolated run over a plugin set
//! - **Kernel**: clock, plan queue, event bus, data managers and reports
//! - **ActorContext / DataManagerContext / ReportContext / PluginContext**:
//!   what each kind of component may do
//! - **SimulationError**: contract and structural failures
//!
//! # Usage Example
//!
//! ```rust
//! use agent_sim_kernel::plugins::Plugin;
//! use agent_sim_kernel::simulation::*;
//!
//! let plugin = Plugin::new("reports", |context| {
//!     context.add_report("ticks", |report| {
//!         report.subscribe_to_period(ReportPeriod::EndOfSimulation, |report| {
//!             let header = ReportHeader::new(["time"]);
//!             report.release_report_item(ReportItem::new(header, vec![report.time().to_string()])?)
//!         })
//!     })
//! });
//!
//! let outcome = Simulation::builder().add_plugin(plugin).build()?.run()?;
//! assert_eq!(outcome.report_items.len(), 1);
//! # Ok::<(), SimulationError>(())
//! ```

pub mod context;
pub mod error;
pub mod instance;
pub mod kernel;
pub mod logging;
pub mod report;
pub mod statistics;

// Re-export all public types for convenience
pub use context::*;
pub use error::*;
pub use instance::*;
pub use kernel::Kernel;
pub use logging::*;
pub use report::{ReportHeader, ReportItem, ReportPeriod};
pub use statistics::*;
