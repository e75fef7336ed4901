//! Multi-scenario experiments
//!
//! An experiment expands a base plugin data set across dimensions into
//! scenarios, runs each scenario as an isolated simulation on a worker pool
//! and writes every report row into resumable tab-delimited files.
//!
//! # Overview
//!
//! - **Dimension**: one axis of variation, a list of level functions
//! - **ScenarioDescriptor**: a point of the parameter space with its seed
//! - **Experiment**: expansion plus parallel execution and resume
//! - **OutputManager / ProgressLog**: the files an execution leaves behind
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use agent_sim_kernel::experiment::*;
//! use agent_sim_kernel::plugins::Plugin;
//!
//! let experiment = Experiment::new(|_data| Ok(vec![Plugin::new("model", |_| Ok(()))]))
//!     .with_settings(ExperimentSettings {
//!         thread_count: 4,
//!         master_seed: 2024,
//!         output_directory: "runs".into(),
//!         ..ExperimentSettings::default()
//!     });
//!
//! let report = experiment.execute()?;
//! println!("{}", report.statistics);
//! # Ok::<(), ExperimentError>(())
//! ```

pub mod dimension;
pub mod error;
pub mod output;
pub mod progress;
pub mod runner;
pub mod scenario;
pub mod statistics;

pub use dimension::{Dimension, LevelFn};
pub use error::ExperimentError;
pub use output::{OutputManager, StreamFailure, OUTPUT_EXTENSION};
pub use progress::{ProgressLog, ProgressRecord, ProgressSnapshot, PROGRESS_FILE};
pub use runner::{Experiment, ExperimentReport, ExperimentSettings, PluginFactory};
pub use scenario::{derive_seed, expand, meta_columns, ScenarioComposition, ScenarioDescriptor, ScenarioStatus};
pub use statistics::ExperimentStatistics;
