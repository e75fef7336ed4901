//! Demonstration contagion model
//!
//! A susceptible-infectious-recovered model built only from kernel
//! mechanisms: one data manager owning disease states, one actor driving
//! contacts and recoveries through data plans, a labeler selecting state
//! changes, a cached index of infectious people and a periodic report.
//! The command-line binary and the integration tests run it.
//!
//! Two plugins make up the model. `disease` owns the manager and the actor;
//! `compartment_reports` depends on it and registers the report.
//!
//! ```rust
//! use agent_sim_kernel::demo::{self, DiseaseData};
//! use agent_sim_kernel::simulation::Simulation;
//!
//! let data = demo::base_data(DiseaseData::builder().population_size(50).build()?);
//! let outcome = Simulation::builder().add_plugins(demo::plugins(&data)?).seed(11).build()?.run()?;
//! assert!(!outcome.report_items.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actor;
pub mod data;
pub mod manager;
pub mod report;

pub use actor::{init_contagion_actor, DiseasePlan};
pub use data::{DiseaseData, DiseaseDataBuilder, DiseaseSnapshot};
pub use manager::{DiseaseManager, DiseaseState, DiseaseStateChange, STATE_LABELER};
pub use report::{init_reports, COMPARTMENT_COLUMNS, COMPARTMENT_REPORT};

use crate::data::PluginDataSet;
use crate::experiment::{Dimension, Experiment};
use crate::plugins::Plugin;
use crate::simulation::{ContractError, PluginContext, SimulationResult};
use crate::types::{ExperimentConfig, PluginId};

/// Id of the plugin owning disease states
pub const DISEASE_PLUGIN: &str = "disease";

/// Id of the plugin registering the report
pub const REPORTS_PLUGIN: &str = "compartment_reports";

/// Plugin data every scenario of the model starts from
pub fn base_data(disease: DiseaseData) -> PluginDataSet {
    let mut data = PluginDataSet::new();
    data.insert(PluginId::new(DISEASE_PLUGIN), disease);
    data
}

/// Build the model's plugins from a scenario's plugin data
///
/// A [`DiseaseSnapshot`] supplied next to the parameters replaces the
/// seeded initial infections.
pub fn plugins(data: &PluginDataSet) -> SimulationResult<Vec<Plugin>> {
    let disease_plugin = PluginId::new(DISEASE_PLUGIN);
    let mut disease = Plugin::new(DISEASE_PLUGIN, init_disease)
        .with_data(data.require::<DiseaseData>(&disease_plugin)?.clone());
    if let Some(snapshot) = data.get::<DiseaseSnapshot>(&disease_plugin) {
        disease = disease.with_data(snapshot.clone());
    }

    let reports = Plugin::new(REPORTS_PLUGIN, init_reports).with_dependency(DISEASE_PLUGIN);
    Ok(vec![disease, reports])
}

fn init_disease(context: &mut PluginContext<'_>) -> SimulationResult<()> {
    let mut manager = DiseaseManager::new(context.plugin_data::<DiseaseData>()?.clone());
    if let Some(snapshot) = context.optional_plugin_data::<DiseaseSnapshot>() {
        manager = manager.restored_from(snapshot.clone());
    }
    context.add_data_manager(manager);
    context.add_actor(init_contagion_actor);
    Ok(())
}

/// Dimension varying the transmission probability
pub fn transmission_dimension(probabilities: &[f64]) -> Dimension {
    probabilities.iter().fold(
        Dimension::new("transmission", ["transmission_probability"]),
        |dimension, &probability| {
            dimension.with_level(move |data: &mut PluginDataSet| {
                let plugin = PluginId::new(DISEASE_PLUGIN);
                let updated = data
                    .require::<DiseaseData>(&plugin)?
                    .to_builder()
                    .transmission_probability(probability)
                    .build()?;
                data.insert(plugin, updated);
                Ok(vec![probability.to_string()])
            })
        },
    )
}

/// Dimension repeating every other combination `count` times
///
/// Replicates differ only in their derived seed.
pub fn replicate_dimension(count: usize) -> Dimension {
    (0..count).fold(Dimension::new("replicate", ["replicate"]), |dimension, replicate| {
        dimension.with_level(move |_: &mut PluginDataSet| Ok::<_, ContractError>(vec![replicate.to_string()]))
    })
}

/// Experiment over the model described by a configuration
///
/// Scenarios vary the transmission probability (fastest) and the replicate.
pub fn experiment(config: &ExperimentConfig, master_seed: u64) -> Result<Experiment, ContractError> {
    let disease = DiseaseData::builder()
        .population_size(config.population_size)
        .initial_infections(config.initial_infections)
        .contact_rate(config.contact_rate)
        .infectious_period(config.infectious_period)
        .horizon(config.horizon)
        .build()?;

    Ok(Experiment::new(plugins)
        .with_base_data(base_data(disease))
        .add_dimension(transmission_dimension(&config.transmission_probabilities))
        .add_dimension(replicate_dimension(config.replicates))
        .with_settings(config.experiment_settings(master_seed)))
}
