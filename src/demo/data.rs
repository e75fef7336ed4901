//! Contagion model parameters

use serde::{Deserialize, Serialize};

use crate::data::PluginData;
use crate::simulation::{ContractError, ContractErrorKind};
use crate::types::EntityId;

use super::manager::DiseaseState;

/// Immutable parameters of the contagion model
///
/// Built through [`DiseaseDataBuilder`], which rejects out-of-range values.
///
/// ```rust
/// use agent_sim_kernel::demo::DiseaseData;
///
/// let data = DiseaseData::builder().population_size(200).initial_infections(3).build().unwrap();
/// let riskier = data.to_builder().transmission_probability(0.4).build().unwrap();
/// assert_eq!(riskier.population_size(), 200);
/// assert!(DiseaseData::builder().initial_infections(0).build().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseData {
    population_size: usize,
    initial_infections: usize,
    transmission_probability: f64,
    contact_rate: f64,
    infectious_period: f64,
    horizon: f64,
}

impl PluginData for DiseaseData {}

impl DiseaseData {
    /// Start from the default parameters
    pub fn builder() -> DiseaseDataBuilder {
        DiseaseDataBuilder::default()
    }

    /// Start from these parameters
    pub fn to_builder(&self) -> DiseaseDataBuilder {
        DiseaseDataBuilder {
            population_size: self.population_size,
            initial_infections: self.initial_infections,
            transmission_probability: self.transmission_probability,
            contact_rate: self.contact_rate,
            infectious_period: self.infectious_period,
            horizon: self.horizon,
        }
    }

    /// Number of people
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// People infectious at time zero
    pub fn initial_infections(&self) -> usize {
        self.initial_infections
    }

    /// Probability that one contact transmits
    pub fn transmission_probability(&self) -> f64 {
        self.transmission_probability
    }

    /// Contacts per infectious person per time unit
    pub fn contact_rate(&self) -> f64 {
        self.contact_rate
    }

    /// Time from infection to recovery
    pub fn infectious_period(&self) -> f64 {
        self.infectious_period
    }

    /// No contacts are scheduled after this time
    pub fn horizon(&self) -> f64 {
        self.horizon
    }
}

/// Fallible builder for [`DiseaseData`]
#[derive(Debug, Clone)]
pub struct DiseaseDataBuilder {
    population_size: usize,
    initial_infections: usize,
    transmission_probability: f64,
    contact_rate: f64,
    infectious_period: f64,
    horizon: f64,
}

impl Default for DiseaseDataBuilder {
    fn default() -> Self {
        Self {
            population_size: 1_000,
            initial_infections: 5,
            transmission_probability: 0.1,
            contact_rate: 2.0,
            infectious_period: 7.0,
            horizon: 100.0,
        }
    }
}

impl DiseaseDataBuilder {
    /// Set the number of people
    pub fn population_size(mut self, value: usize) -> Self {
        self.population_size = value;
        self
    }

    /// Set the number of people infectious at time zero
    pub fn initial_infections(mut self, value: usize) -> Self {
        self.initial_infections = value;
        self
    }

    /// Set the per-contact transmission probability
    pub fn transmission_probability(mut self, value: f64) -> Self {
        self.transmission_probability = value;
        self
    }

    /// Set the contact rate
    pub fn contact_rate(mut self, value: f64) -> Self {
        self.contact_rate = value;
        self
    }

    /// Set the infectious period
    pub fn infectious_period(mut self, value: f64) -> Self {
        self.infectious_period = value;
        self
    }

    /// Set the contact horizon
    pub fn horizon(mut self, value: f64) -> Self {
        self.horizon = value;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<DiseaseData, ContractError> {
        let invalid = |detail: String| Err(ContractError::new(ContractErrorKind::InvalidValue, detail));

        if self.population_size == 0 {
            return invalid("population size must be positive".into());
        }
        if self.initial_infections == 0 || self.initial_infections > self.population_size {
            return invalid(format!(
                "initial infections must be in 1..={}, got {}",
                self.population_size, self.initial_infections
            ));
        }
        if !(0.0..=1.0).contains(&self.transmission_probability) {
            return invalid(format!("transmission probability {} is not in [0, 1]", self.transmission_probability));
        }
        for (name, value) in [
            ("contact rate", self.contact_rate),
            ("infectious period", self.infectious_period),
            ("horizon", self.horizon),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }

        Ok(DiseaseData {
            population_size: self.population_size,
            initial_infections: self.initial_infections,
            transmission_probability: self.transmission_probability,
            contact_rate: self.contact_rate,
            infectious_period: self.infectious_period,
            horizon: self.horizon,
        })
    }
}

/// Disease states of every person, captured at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseSnapshot {
    states: Vec<DiseaseState>,
}

impl PluginData for DiseaseSnapshot {}

impl DiseaseSnapshot {
    pub(crate) fn new(states: Vec<DiseaseState>) -> Self {
        Self { states }
    }

    /// State of one person
    pub fn state(&self, person: EntityId) -> Option<DiseaseState> {
        self.states.get(person.0 as usize).copied()
    }

    /// States in person order
    pub fn states(&self) -> &[DiseaseState] {
        &self.states
    }
}
