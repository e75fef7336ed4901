//! Scenario expansion and seeding
//!
//! Scenarios are the points of the experiment's parameter space. Each one
//! gets its own plugin data, metadata values and a seed derived from the
//! master seed and its id, so its results do not depend on which worker
//! runs it or when.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::dimension::Dimension;
use crate::data::PluginDataSet;
use crate::simulation::{ContractError, ContractErrorKind};
use crate::types::ScenarioId;

/// Golden-ratio increment used to spread scenario ids over the seed space
const SEED_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed of one scenario's random generator
///
/// A splitmix64 step over `master_seed` advanced by the scenario id, so
/// neighbouring ids get unrelated seeds.
pub fn derive_seed(master_seed: u64, scenario: ScenarioId) -> u64 {
    let mut z = master_seed.wrapping_add((scenario.0 as u64).wrapping_add(1).wrapping_mul(SEED_GAMMA));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Lifecycle of a scenario within one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Not run (yet)
    Ready,
    /// Ran to completion and its output was written
    Succeeded,
    /// Failed with a contract error, an I/O error or a panic
    Failed,
    /// Succeeded in an earlier execution; skipped on resume
    PreviouslySucceeded,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScenarioStatus::Ready => "ready",
            ScenarioStatus::Succeeded => "succeeded",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::PreviouslySucceeded => "previously succeeded",
        };
        f.write_str(text)
    }
}

/// How dimension levels are combined into scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScenarioComposition {
    /// Every combination of levels; the first dimension varies fastest
    #[default]
    CrossProduct,
    /// The listed level tuples, one per scenario, in order
    Explicit(Vec<Vec<usize>>),
}

/// One configured scenario, ready to run
#[derive(Debug, Clone)]
pub struct ScenarioDescriptor {
    id: ScenarioId,
    levels: Vec<usize>,
    seed: u64,
    meta_values: Vec<String>,
    data: PluginDataSet,
}

impl ScenarioDescriptor {
    /// Scenario id
    pub fn id(&self) -> ScenarioId {
        self.id
    }

    /// Level index per dimension
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    /// Derived seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Metadata values, in dimension then column order
    pub fn meta_values(&self) -> &[String] {
        &self.meta_values
    }

    /// Plugin data after all levels were applied
    pub fn data(&self) -> &PluginDataSet {
        &self.data
    }
}

/// Level tuples in scenario order
fn level_tuples(dimensions: &[Dimension], composition: &ScenarioComposition) -> Result<Vec<Vec<usize>>, ContractError> {
    let counts: Vec<usize> = dimensions.iter().map(Dimension::level_count).collect();
    match composition {
        ScenarioComposition::CrossProduct => {
            let total: usize = counts.iter().product();
            Ok((0..total)
                .map(|mut index| {
                    counts
                        .iter()
                        .map(|count| {
                            let level = index % count;
                            index /= count;
                            level
                        })
                        .collect()
                })
                .collect())
        }
        ScenarioComposition::Explicit(tuples) => {
            for (position, tuple) in tuples.iter().enumerate() {
                let valid = tuple.len() == counts.len()
                    && tuple.iter().zip(&counts).all(|(level, count)| level < count);
                if !valid {
                    return Err(ContractError::new(
                        ContractErrorKind::InvalidDimension,
                        format!("scenario {} has level tuple {:?} for level counts {:?}", position, tuple, counts),
                    ));
                }
            }
            Ok(tuples.clone())
        }
    }
}

/// Expand a base configuration across dimensions
///
/// Scenario ids are assigned densely from zero in composition order.
pub fn expand(
    base: &PluginDataSet,
    dimensions: &[Dimension],
    composition: &ScenarioComposition,
    master_seed: u64,
) -> Result<Vec<ScenarioDescriptor>, ContractError> {
    for dimension in dimensions {
        dimension.validate()?;
    }

    level_tuples(dimensions, composition)?
        .into_iter()
        .enumerate()
        .map(|(index, levels)| {
            let id = ScenarioId(index);
            let mut data = base.clone();
            let mut meta_values = Vec::new();
            for (dimension, &level) in dimensions.iter().zip(&levels) {
                meta_values.extend(dimension.apply(level, &mut data)?);
            }
            Ok(ScenarioDescriptor { id, levels, seed: derive_seed(master_seed, id), meta_values, data })
        })
        .collect()
}

/// Metadata column names of all dimensions, in order
pub fn meta_columns(dimensions: &[Dimension]) -> Vec<String> {
    dimensions.iter().flat_map(|d| d.meta_columns().iter().cloned()).collect()
}
