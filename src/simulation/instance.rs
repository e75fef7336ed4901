//! Simulation instance: build, initialize, run
//!
//! A [`Simulation`] is one isolated run over a set of plugins. Building it
//! resolves the plugin order, so wiring errors surface before any plan runs.
//! Running it consumes the simulation and returns the released report rows,
//! run statistics and, when requested, the state needed to continue later.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::error::{ContractErrorKind, SimulationError, SimulationResult};
use super::kernel::Kernel;
use super::report::ReportItem;
use super::statistics::RunStatistics;
use crate::data::PluginDataSet;
use crate::plans::PlanQueueSnapshot;
use crate::plugins::{DependencyGraph, Plugin};
use crate::types::{PluginId, ScenarioId};

/// Kernel state captured when a run stops, used to continue it
///
/// Only plans carrying plan data are captured. The random generator is
/// captured as well, so a continued run draws the same numbers the
/// uninterrupted run would have drawn.
#[derive(Debug, Clone)]
pub struct SimulationState {
    time: f64,
    plans: PlanQueueSnapshot,
    rng: StdRng,
}

impl SimulationState {
    /// Simulation time at capture
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Captured pending plans in execution order
    pub fn plans(&self) -> &PlanQueueSnapshot {
        &self.plans
    }
}

/// Everything a finished run hands back
#[derive(Debug)]
pub struct SimulationOutcome {
    /// Scenario the run belonged to, if any
    pub scenario: Option<ScenarioId>,
    /// Rows released by reports, in release order
    pub report_items: Vec<ReportItem>,
    /// Counters gathered during the run
    pub statistics: RunStatistics,
    /// Captured kernel state, when state recording was enabled
    pub state: Option<SimulationState>,
    /// Data manager end-of-run snapshots, when state recording was enabled
    pub plugin_data: PluginDataSet,
}

impl SimulationOutcome {
    /// Simulation time when the run ended
    pub fn final_time(&self) -> f64 {
        self.statistics.final_time
    }
}

/// Builder for [`Simulation`]
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    plugins: Vec<Plugin>,
    seed: u64,
    halt_time: Option<f64>,
    record_state: bool,
    resume_from: Option<SimulationState>,
    scenario: Option<ScenarioId>,
}

impl SimulationBuilder {
    /// Add a plugin
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Add several plugins
    pub fn add_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Seed of the run's random generator
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Stop before any plan scheduled after `time`
    pub fn halt_time(mut self, time: f64) -> Self {
        self.halt_time = Some(time);
        self
    }

    /// Capture kernel state and data manager snapshots at the end of the run
    pub fn record_state(mut self, record: bool) -> Self {
        self.record_state = record;
        self
    }

    /// Continue from a captured state
    pub fn resume_from(mut self, state: SimulationState) -> Self {
        self.resume_from = Some(state);
        self
    }

    /// Tag the run with a scenario id
    pub fn scenario(mut self, scenario: ScenarioId) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Resolve the plugin order and validate the configuration
    pub fn build(self) -> SimulationResult<Simulation> {
        if let Some(halt_time) = self.halt_time {
            if halt_time.is_nan() {
                return Err(SimulationError::contract(ContractErrorKind::InvalidTime, "halt time is NaN"));
            }
        }

        let mut graph = DependencyGraph::new();
        for plugin in &self.plugins {
            graph.register(plugin.id().clone(), plugin.dependencies().to_vec())?;
        }
        let order = graph.resolve_order()?;

        let closures: IndexMap<PluginId, _> =
            order.iter().map(|id| (id.clone(), graph.closure(id))).collect();

        let mut by_id: IndexMap<PluginId, Plugin> =
            self.plugins.into_iter().map(|plugin| (plugin.id().clone(), plugin)).collect();
        let plugins: Vec<Plugin> = order.iter().filter_map(|id| by_id.shift_remove(id)).collect();

        Ok(Simulation {
            plugins,
            closures,
            seed: self.seed,
            halt_time: self.halt_time,
            record_state: self.record_state,
            resume_from: self.resume_from,
            scenario: self.scenario,
        })
    }
}

/// A configured, not yet run simulation instance
///
/// ```rust
/// use agent_sim_kernel::plugins::Plugin;
/// use agent_sim_kernel::simulation::Simulation;
///
/// let simulation = Simulation::builder()
///     .add_plugin(Plugin::new("clock", |context| {
///         context.add_actor(|actor| {
///             actor.add_plan(3.0, |_| Ok(()))?;
///             Ok(())
///         });
///         Ok(())
///     }))
///     .seed(7)
///     .build()
///     .unwrap();
/// let outcome = simulation.run().unwrap();
/// assert_eq!(outcome.final_time(), 3.0);
/// ```
#[derive(Debug)]
pub struct Simulation {
    plugins: Vec<Plugin>,
    closures: IndexMap<PluginId, indexmap::IndexSet<PluginId>>,
    seed: u64,
    halt_time: Option<f64>,
    record_state: bool,
    resume_from: Option<SimulationState>,
    scenario: Option<ScenarioId>,
}

impl Simulation {
    /// Start building a simulation
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::default()
    }

    /// Plugin ids in initialization order
    pub fn plugin_order(&self) -> Vec<PluginId> {
        self.plugins.iter().map(|plugin| plugin.id().clone()).collect()
    }

    /// Initialize every component and run plans to completion
    #[instrument(skip(self), fields(scenario = ?self.scenario, seed = self.seed))]
    pub fn run(self) -> SimulationResult<SimulationOutcome> {
        let started = Instant::now();
        let mut kernel = Kernel::new(self.seed, self.halt_time, self.scenario, self.closures);

        let resume = self.resume_from;
        if let Some(state) = &resume {
            debug!("Resuming at t={} with {} captured plans", state.time, state.plans.len());
            kernel.set_resume_point(state.time);
        }

        for plugin in self.plugins {
            kernel.initialize_plugin(plugin)?;
        }
        kernel.initialize_reports()?;
        kernel.initialize_actors()?;

        if let Some(state) = resume {
            kernel.set_rng(state.rng);
            kernel.restore_plans(state.plans)?;
        }

        kernel.run_plans()?;
        kernel.finish_reports()?;

        let (state, plugin_data) = if self.record_state {
            let state = SimulationState {
                time: kernel.time(),
                plans: kernel.capture_plans(),
                rng: kernel.rng_state(),
            };
            (Some(state), kernel.data_manager_snapshots())
        } else {
            (None, PluginDataSet::new())
        };

        let mut statistics = kernel.finalize_statistics();
        statistics.wall_time = started.elapsed();
        info!("{}", statistics.summary());

        Ok(SimulationOutcome {
            scenario: self.scenario,
            report_items: kernel.into_report_items(),
            statistics,
            state,
            plugin_data,
        })
    }
}
