//! Disease state data manager

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::data::{DiseaseData, DiseaseSnapshot};
use crate::data::{DataManager, MutationScope, PluginData};
use crate::events::{EventLabel, EventLabeler, LabelKey};
use crate::simulation::{ContractError, ContractErrorKind, DataManagerContext, SimulationError, SimulationResult};
use crate::types::EntityId;

/// Labeler keying [`DiseaseStateChange`] by the state entered
pub const STATE_LABELER: &str = "disease_state";

/// Compartment of one person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiseaseState {
    /// Never infected
    Susceptible,
    /// Infected and spreading
    Infectious,
    /// Recovered and immune
    Recovered,
}

impl DiseaseState {
    /// Every state, in compartment order
    pub const ALL: [DiseaseState; 3] = [DiseaseState::Susceptible, DiseaseState::Infectious, DiseaseState::Recovered];

    /// Lowercase name, also used as the label key
    pub fn as_str(&self) -> &'static str {
        match self {
            DiseaseState::Susceptible => "susceptible",
            DiseaseState::Infectious => "infectious",
            DiseaseState::Recovered => "recovered",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn can_become(self, next: DiseaseState) -> bool {
        matches!(
            (self, next),
            (DiseaseState::Susceptible, DiseaseState::Infectious) | (DiseaseState::Infectious, DiseaseState::Recovered)
        )
    }
}

impl fmt::Display for DiseaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published whenever a person changes state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiseaseStateChange {
    /// Who changed
    pub person: EntityId,
    /// State before
    pub previous: DiseaseState,
    /// State after
    pub current: DiseaseState,
}

impl DiseaseStateChange {
    /// Label selecting changes into `state`
    pub fn label(state: DiseaseState) -> EventLabel {
        EventLabel::new::<DiseaseStateChange>(STATE_LABELER, state.as_str())
    }
}

/// Owns the disease state of every person
#[derive(Debug)]
pub struct DiseaseManager {
    parameters: DiseaseData,
    restore_from: Option<DiseaseSnapshot>,
    states: Vec<DiseaseState>,
    counts: [usize; 3],
}

impl DiseaseManager {
    /// Create a manager; states are assigned in `init`
    pub fn new(parameters: DiseaseData) -> Self {
        Self { parameters, restore_from: None, states: Vec::new(), counts: [0; 3] }
    }

    /// Start from captured states instead of seeding infections
    pub fn restored_from(mut self, snapshot: DiseaseSnapshot) -> Self {
        self.restore_from = Some(snapshot);
        self
    }

    /// Model parameters
    pub fn parameters(&self) -> &DiseaseData {
        &self.parameters
    }

    /// Number of people
    pub fn population_size(&self) -> usize {
        self.states.len()
    }

    /// State of one person
    pub fn state(&self, person: EntityId) -> Result<DiseaseState, ContractError> {
        self.states.get(person.0 as usize).copied().ok_or_else(|| {
            ContractError::new(
                ContractErrorKind::UnknownEntity,
                format!("person {} not in population of {}", person, self.states.len()),
            )
        })
    }

    /// Number of people in `state`
    pub fn count(&self, state: DiseaseState) -> usize {
        self.counts[state.index()]
    }

    /// Every person
    pub fn people(&self) -> Vec<EntityId> {
        (0..self.states.len() as u64).map(EntityId).collect()
    }

    /// People currently in `state`, in id order
    pub fn people_in(&self, state: DiseaseState) -> Vec<EntityId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == state)
            .map(|(person, _)| EntityId(person as u64))
            .collect()
    }

    /// Move a person to `next` and queue the change event
    ///
    /// Only susceptible to infectious and infectious to recovered are
    /// allowed; anything else is rejected before the state changes.
    pub fn set_state(
        &mut self,
        scope: &mut MutationScope<'_>,
        person: EntityId,
        next: DiseaseState,
    ) -> Result<(), ContractError> {
        let previous = self.state(person)?;
        if !previous.can_become(next) {
            return Err(ContractError::new(
                ContractErrorKind::InvalidValue,
                format!("person {} cannot go from {} to {}", person, previous, next),
            ));
        }

        self.states[person.0 as usize] = next;
        self.counts[previous.index()] -= 1;
        self.counts[next.index()] += 1;
        scope.publish(DiseaseStateChange { person, previous, current: next });
        Ok(())
    }

    fn recount(&mut self) {
        self.counts = [0; 3];
        for state in &self.states {
            self.counts[state.index()] += 1;
        }
    }
}

impl DataManager for DiseaseManager {
    fn init(&mut self, context: &mut DataManagerContext<'_>) -> SimulationResult<()> {
        context.add_labeler(EventLabeler::new(STATE_LABELER, |_, change: &DiseaseStateChange| {
            LabelKey::from(change.current.as_str())
        }))?;

        let population = self.parameters.population_size();
        match self.restore_from.take() {
            Some(snapshot) => {
                if snapshot.states().len() != population {
                    return Err(SimulationError::contract(
                        ContractErrorKind::InvalidValue,
                        format!("snapshot has {} people, expected {}", snapshot.states().len(), population),
                    ));
                }
                self.states = snapshot.states().to_vec();
            }
            None => {
                self.states = vec![DiseaseState::Susceptible; population];
                let seeded = rand::seq::index::sample(context.rng(), population, self.parameters.initial_infections());
                for person in seeded {
                    self.states[person] = DiseaseState::Infectious;
                }
            }
        }
        self.recount();

        debug!(
            "Disease manager ready: {} susceptible, {} infectious, {} recovered",
            self.count(DiseaseState::Susceptible),
            self.count(DiseaseState::Infectious),
            self.count(DiseaseState::Recovered)
        );
        Ok(())
    }

    fn state_snapshot(&self) -> Option<Arc<dyn PluginData>> {
        Some(Arc::new(DiseaseSnapshot::new(self.states.clone())))
    }
}
